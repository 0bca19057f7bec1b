//! Per-tenant bot credential lookup.
//!
//! Every school configures its own bot token per platform through the
//! dashboard; the relay only reads them. A missing token is an expected
//! condition (the school simply has not set up a bot on that platform) and
//! is recorded through the auditor, never logged as an error.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::types::Platform;

/// Errors from the credential store.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The underlying store failed.
    #[error("credential store query failed: {0}")]
    Store(#[from] sqlx::Error),
}

/// Read-only access to per-`(school, platform)` bot tokens.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch the bot token for a school on a platform, if configured.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] on store failure.
    async fn token(
        &self,
        school_id: i64,
        platform: Platform,
    ) -> Result<Option<String>, CredentialError>;
}

/// SQLite-backed credential store reading `bot_credentials`.
pub struct SqlCredentialStore {
    db: SqlitePool,
}

impl SqlCredentialStore {
    /// Create a store over the shared pool.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Startup sanity probe against the store.
    ///
    /// Run once at boot so a mis-pathed or unreadable database fails the
    /// process immediately instead of at the first webhook.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when the store is unreachable.
    pub async fn probe(&self) -> Result<(), CredentialError> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqlCredentialStore {
    async fn token(
        &self,
        school_id: i64,
        platform: Platform,
    ) -> Result<Option<String>, CredentialError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT token FROM bot_credentials WHERE school_id = ?1 AND platform = ?2",
        )
        .bind(school_id)
        .bind(platform.as_str())
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(token,)| token))
    }
}
