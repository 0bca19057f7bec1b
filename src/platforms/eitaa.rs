//! Eitaa messenger adapter.
//!
//! Eitaa's bot gateway (eitaayar) uses a flat update payload —
//! `{message_id, chat_id, text, date}` — and method URLs of the form
//! `POST {base}/api/{token}/{method}`. Unlike Bale there is no nested
//! `message` envelope, and `chat_id` arrives as a string.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{check_send_response, http_client, DecodeError, DecodedUpdate, PlatformAdapter, SendError};

/// Default Eitaa bot gateway base URL.
pub const DEFAULT_EITAA_API_BASE: &str = "https://eitaayar.ir";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Eitaa update payload (fields we use).
#[derive(Debug, Deserialize)]
struct EitaaUpdate {
    chat_id: Option<EitaaChatId>,
    text: Option<String>,
}

/// Eitaa sends chat ids as strings but some gateway versions emit numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EitaaChatId {
    Text(String),
    Number(i64),
}

impl EitaaChatId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Eitaa bot gateway adapter.
pub struct EitaaAdapter {
    api_base: String,
    client: reqwest::Client,
}

impl EitaaAdapter {
    /// Create an adapter against the given gateway base URL.
    pub fn new(api_base: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_owned(),
            client: http_client(),
        }
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/api/{token}/{method}", self.api_base)
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for EitaaAdapter {
    fn decode(&self, raw: &[u8]) -> Result<DecodedUpdate, DecodeError> {
        let update: EitaaUpdate =
            serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let chat_id = update.chat_id.ok_or(DecodeError::Empty)?.into_string();
        if chat_id.is_empty() {
            return Err(DecodeError::Empty);
        }
        let text = update.text.filter(|t| !t.is_empty()).ok_or(DecodeError::Empty)?;

        Ok(DecodedUpdate {
            external_chat_id: chat_id,
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
        debug!(chat_id, "message sent via Eitaa");
        Ok(())
    }
}
