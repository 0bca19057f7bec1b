//! Webhook HTTP server.
//!
//! One tenant-scoped route per bot: `POST /webhook/:platform/:school_id`
//! receives the platform's native update payload, `GET` on the same path
//! answers liveness probes.
//!
//! Contract: the POST response is always HTTP 200 `{"ok": true}` — a
//! non-2xx answer makes the chat platforms re-deliver the update with
//! backoff, and a retry storm on top of a degraded relay is strictly worse
//! than a dropped update. Internal failures are audited or logged, never
//! signalled to the platform.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::relay::Relay;
use crate::types::Platform;

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// The relay orchestrator.
    pub relay: Relay,
}

/// Build the webhook router.
pub fn router(relay: Relay) -> Router {
    Router::new()
        .route(
            "/webhook/:platform/:school_id",
            post(webhook_update).get(webhook_status),
        )
        .with_state(GatewayState { relay })
}

/// Run the webhook server until SIGINT/SIGTERM.
///
/// In-flight AI streams are dropped on shutdown; partial output already
/// relayed to chats stands.
///
/// # Errors
///
/// Returns an error if the listen address cannot be bound or the server
/// exits abnormally.
pub async fn run_gateway(server: &ServerConfig, relay: Relay) -> anyhow::Result<()> {
    let app = router(relay);
    let bind_addr = format!("{}:{}", server.bind, server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("binding to {bind_addr}: {e}"))?;
    info!(%bind_addr, "webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("webhook server exited: {e}"))?;
    info!("webhook server stopped");
    Ok(())
}

/// Completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining in-flight updates");
}

/// POST handler: hand the raw payload to the relay, ack unconditionally.
///
/// Exposed for integration testing; production traffic arrives through
/// [`router`].
#[doc(hidden)]
pub async fn webhook_update(
    State(state): State<GatewayState>,
    Path((platform, school_id)): Path<(String, String)>,
    body: Bytes,
) -> Json<Value> {
    match parse_route(&platform, &school_id) {
        Some((platform, school_id)) => {
            state.relay.accept(platform, school_id, &body).await;
        }
        None => {
            // Still ack: a misconfigured webhook URL must not trigger the
            // platform's retry storm either.
            warn!(%platform, %school_id, "update for unroutable webhook path dropped");
        }
    }
    Json(json!({ "ok": true }))
}

/// GET handler: liveness/status payload for probes and manual checks.
#[doc(hidden)]
pub async fn webhook_status(
    Path((platform, school_id)): Path<(String, String)>,
) -> Json<Value> {
    let status = if parse_route(&platform, &school_id).is_some() {
        "ok"
    } else {
        "unknown route"
    };
    Json(json!({
        "status": status,
        "service": "peyk",
        "school_id": school_id,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn parse_route(platform: &str, school_id: &str) -> Option<(Platform, i64)> {
    let platform = Platform::from_path_segment(platform)?;
    let school_id = school_id.parse::<i64>().ok()?;
    Some((platform, school_id))
}
