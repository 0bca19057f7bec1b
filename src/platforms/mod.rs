//! Chat platform adapters.
//!
//! Defines the [`PlatformAdapter`] trait and the shared decode/send error
//! types used by both adapter implementations:
//! - [`bale::BaleAdapter`] — Bale messenger, Telegram-compatible Bot API
//! - [`eitaa::EitaaAdapter`] — Eitaa messenger, eitaayar HTTP API
//!
//! Adapters normalize an inbound update into a [`DecodedUpdate`] and encode
//! outbound text / typing indicators into the platform's send calls. They
//! perform no retries; retry policy, if any, belongs to the caller.

use async_trait::async_trait;
use regex::Regex;

pub mod bale;
pub mod eitaa;

/// HTTP connect timeout for platform API calls.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for platform API calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// The platform-independent content of one inbound update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedUpdate {
    /// Platform-native chat identifier.
    pub external_chat_id: String,
    /// Plain message text.
    pub text: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while decoding an inbound update payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload could not be parsed as the platform's update format.
    #[error("malformed update payload: {0}")]
    Malformed(String),
    /// The update parsed but carries no text or no chat id.
    #[error("update carries no text or chat id")]
    Empty,
}

/// Errors produced by outbound platform API calls.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The platform rejected the bot token.
    #[error("platform rejected bot token")]
    Unauthorized,
    /// The platform asked us to slow down.
    #[error("platform rate limit hit")]
    RateLimited,
    /// Transport failure or an unexpected platform response.
    #[error("platform send failed: {0}")]
    Network(String),
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(sanitize_send_error(&err.to_string()))
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers (shared by both adapters)
// ---------------------------------------------------------------------------

/// Build the HTTP client used for platform API calls.
///
/// Connect and request timeouts keep a wedged platform API from pinning a
/// relay task; a stalled send surfaces as [`SendError::Network`].
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to build HTTP client with timeouts, using default");
            reqwest::Client::default()
        })
}

/// Map a platform API response status onto the send error taxonomy.
///
/// # Errors
///
/// Returns `SendError::Unauthorized` on 401/403, `SendError::RateLimited`
/// on 429, and `SendError::Network` for any other non-success status.
pub(crate) async fn check_send_response(response: reqwest::Response) -> Result<(), SendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    match status.as_u16() {
        401 | 403 => Err(SendError::Unauthorized),
        429 => Err(SendError::RateLimited),
        code => {
            let body = response.text().await.unwrap_or_default();
            Err(SendError::Network(format!(
                "status {code}: {}",
                sanitize_send_error(&body)
            )))
        }
    }
}

/// Strip bot tokens out of error text before it reaches logs.
///
/// Both platforms use Telegram-style `<numeric-id>:<secret>` tokens that
/// appear in request URLs and can echo back in error bodies.
fn sanitize_send_error(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let sanitized = match Regex::new(r"\d{6,}:[A-Za-z0-9_\-]{20,}") {
        Ok(regex) => regex.replace_all(&collapsed, "[REDACTED]").into_owned(),
        Err(_) => collapsed,
    };

    const MAX_ERROR_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_CHARS {
        let shortened = sanitized.chars().take(MAX_ERROR_CHARS).collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One chat platform's decode and send surface.
///
/// Implementations must be `Send + Sync`; the relay shares them across
/// per-chat tasks behind an `Arc`.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Decode a raw webhook body into a normalized update.
    ///
    /// Decoding is pure: no I/O, no side effects, and the same payload
    /// always decodes to the same value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] on an unparseable payload and
    /// [`DecodeError::Empty`] when the update has no text or chat id.
    fn decode(&self, raw: &[u8]) -> Result<DecodedUpdate, DecodeError>;

    /// Send a typing indicator to a chat. Best-effort by contract.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] on API or transport failure; callers are
    /// expected to ignore it for typing indicators.
    async fn send_typing(&self, token: &str, chat_id: &str) -> Result<(), SendError>;

    /// Send plain text to a chat.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] on API or transport failure.
    async fn send_text(&self, token: &str, chat_id: &str, text: &str) -> Result<(), SendError>;
}
