//! Core types shared across the relay: platforms, normalized messages,
//! per-chat keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External chat platform a school bot runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Bale messenger (Telegram-compatible Bot API).
    Bale,
    /// Eitaa messenger (eitaayar HTTP API).
    Eitaa,
}

impl Platform {
    /// Stable lowercase identifier used in URLs, logs, and database rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bale => "bale",
            Self::Eitaa => "eitaa",
        }
    }

    /// Parse a webhook path segment into a platform.
    ///
    /// Returns `None` for unknown segments; the caller decides how to
    /// report that (the webhook handler still acks).
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "bale" => Some(Self::Bale),
            "eitaa" => Some(Self::Eitaa),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized inbound chat message, constructed once per webhook call.
///
/// `tenant_hint` is the school id carried by the webhook route; identity
/// resolution must agree with it before the message is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Originating platform.
    pub platform: Platform,
    /// School id from the tenant-scoped webhook URL.
    pub tenant_hint: i64,
    /// Platform-native chat identifier.
    pub external_chat_id: String,
    /// Plain message text as received.
    pub raw_text: String,
    /// Server-side receive timestamp.
    pub received_at: DateTime<Utc>,
}

/// Key identifying one conversation for ordering purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatKey {
    /// Originating platform.
    pub platform: Platform,
    /// Platform-native chat identifier.
    pub external_chat_id: String,
}

impl ChatKey {
    /// Build the ordering key for an inbound message.
    pub fn of(msg: &InboundMessage) -> Self {
        Self {
            platform: msg.platform,
            external_chat_id: msg.external_chat_id.clone(),
        }
    }
}

impl std::fmt::Display for ChatKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.platform, self.external_chat_id)
    }
}
