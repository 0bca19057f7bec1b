//! Bale messenger adapter.
//!
//! Bale exposes a Telegram-compatible Bot API: updates arrive as
//! `{update_id, message: {chat, text, ...}}` objects and outbound calls go
//! to `POST {base}/bot{token}/{method}`. Only the plain-text subset is
//! handled; media, callbacks, and service messages decode as empty.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{check_send_response, http_client, DecodeError, DecodedUpdate, PlatformAdapter, SendError};

/// Default Bale Bot API base URL.
pub const DEFAULT_BALE_API_BASE: &str = "https://tapi.bale.ai";

// ---------------------------------------------------------------------------
// Wire types (minimal subset of the Bot API)
// ---------------------------------------------------------------------------

/// Bale `Update` object.
#[derive(Debug, Deserialize)]
struct BaleUpdate {
    #[allow(dead_code)] // present on every update, unused after decode
    update_id: i64,
    message: Option<BaleMessage>,
}

/// Bale `Message` object (fields we use).
#[derive(Debug, Deserialize)]
struct BaleMessage {
    chat: BaleChat,
    text: Option<String>,
}

/// Bale `Chat` object.
#[derive(Debug, Deserialize)]
struct BaleChat {
    id: i64,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Bale Bot API adapter.
pub struct BaleAdapter {
    api_base: String,
    client: reqwest::Client,
}

impl BaleAdapter {
    /// Create an adapter against the given API base URL.
    pub fn new(api_base: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_owned(),
            client: http_client(),
        }
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{token}/{method}", self.api_base)
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for BaleAdapter {
    fn decode(&self, raw: &[u8]) -> Result<DecodedUpdate, DecodeError> {
        let update: BaleUpdate =
            serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let message = update.message.ok_or(DecodeError::Empty)?;
        let text = message.text.filter(|t| !t.is_empty()).ok_or(DecodeError::Empty)?;

        Ok(DecodedUpdate {
            external_chat_id: message.chat.id.to_string(),
            text,
        })
    }

    async fn send_typing(&self, token: &str, chat_id: &str) -> Result<(), SendError> {
        let body = json!({ "chat_id": chat_id, "action": "typing" });
        let response = self
            .client
            .post(self.method_url(token, "sendChatAction"))
            .json(&body)
            .send()
            .await?;
        check_send_response(response).await
    }

    async fn send_text(&self, token: &str, chat_id: &str, text: &str) -> Result<(), SendError> {
        let body = json!({ "chat_id": chat_id, "text": text });
        let response = self
            .client
            .post(self.method_url(token, "sendMessage"))
            .json(&body)
            .send()
            .await?;
        check_send_response(response).await?;
        debug!(chat_id, "message sent via Bale");
        Ok(())
    }
}
