//! Interaction audit trail.
//!
//! Unmatched and failed interactions are the operator's signal that a
//! student messaged a bot before registering, or that a school forgot to
//! configure a token. The auditor appends them to `interaction_log` for
//! dashboard follow-up. Recording is best-effort: an insert failure is
//! logged locally and never blocks or fails the relay.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{trace, warn};

use crate::types::Platform;

/// Why an interaction ended without an AI answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditReason {
    /// No chat binding matched the sender (or it belonged to another tenant).
    UnmatchedUser,
    /// The school has no bot token for the platform.
    MissingBotToken,
    /// The update payload could not be parsed.
    MalformedUpdate,
    /// The update parsed but carried no text or chat id.
    EmptyUpdate,
}

impl AuditReason {
    /// Stable string stored in the audit table and asserted by dashboards.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnmatchedUser => "unmatched user",
            Self::MissingBotToken => "missing bot token",
            Self::MalformedUpdate => "malformed update",
            Self::EmptyUpdate => "empty update",
        }
    }
}

impl std::fmt::Display for AuditReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record.
#[derive(Debug, Clone)]
pub struct InteractionLogEntry {
    /// Originating platform.
    pub platform: Platform,
    /// Platform-native chat id; empty when decoding never produced one.
    pub external_chat_id: String,
    /// Message text as received (or a truncated raw body on decode failure).
    pub raw_text: String,
    /// Terminal reason.
    pub reason: AuditReason,
    /// When the interaction was received.
    pub timestamp: DateTime<Utc>,
}

/// Append-only sink for unmatched/failed interactions.
#[async_trait]
pub trait Auditor: Send + Sync {
    /// Record one entry. Best-effort: implementations swallow failures.
    async fn record(&self, entry: InteractionLogEntry);
}

/// SQLite-backed auditor appending to `interaction_log`.
pub struct SqlAuditor {
    db: SqlitePool,
}

impl SqlAuditor {
    /// Create an auditor over the shared pool.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Auditor for SqlAuditor {
    async fn record(&self, entry: InteractionLogEntry) {
        let result = sqlx::query(
            "INSERT INTO interaction_log (platform, external_chat_id, raw_text, reason, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(entry.platform.as_str())
        .bind(&entry.external_chat_id)
        .bind(&entry.raw_text)
        .bind(entry.reason.as_str())
        .bind(entry.timestamp.to_rfc3339())
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => trace!(
                platform = %entry.platform,
                reason = %entry.reason,
                "interaction logged"
            ),
            Err(e) => warn!(
                platform = %entry.platform,
                reason = %entry.reason,
                error = %e,
                "failed to record interaction audit entry"
            ),
        }
    }
}
