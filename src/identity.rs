//! Chat-to-user identity resolution.
//!
//! Maps a `(platform, external chat id)` pair onto an internal user and
//! school via the externally-owned `chat_bindings` store. A miss is an
//! expected, frequent outcome (anonymous senders), not a fault.
//!
//! Tenant isolation lives here: the webhook URL carries the school id the
//! bot belongs to, and a binding pointing at a different school resolves to
//! `None` exactly like a missing binding. A stale or duplicated binding must
//! never leak a message across tenants.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::ai::ModelPreference;
use crate::types::Platform;

/// A resolved internal identity for an external chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    /// Internal user id.
    pub user_id: i64,
    /// School (tenant) the user belongs to.
    pub school_id: i64,
    /// User role forwarded to the AI backend (e.g. "student", "teacher").
    pub role: String,
    /// Stored cloud/local inference preference.
    pub model_preference: ModelPreference,
}

/// Errors from the binding store.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The underlying store failed.
    #[error("binding store query failed: {0}")]
    Store(#[from] sqlx::Error),
}

/// Resolves external chats to internal users within one tenant.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Look up the binding for `(platform, external_chat_id)`.
    ///
    /// Returns `None` when no binding exists or when the bound school does
    /// not match `tenant_hint`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] on store failure.
    async fn resolve(
        &self,
        platform: Platform,
        external_chat_id: &str,
        tenant_hint: i64,
    ) -> Result<Option<ResolvedUser>, ResolveError>;
}

/// SQLite-backed resolver reading `chat_bindings` joined with `users`.
///
/// Read-only: the rows are owned by the dashboard subsystem.
pub struct SqlIdentityResolver {
    db: SqlitePool,
}

impl SqlIdentityResolver {
    /// Create a resolver over the shared pool.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityResolver for SqlIdentityResolver {
    async fn resolve(
        &self,
        platform: Platform,
        external_chat_id: &str,
        tenant_hint: i64,
    ) -> Result<Option<ResolvedUser>, ResolveError> {
        let row: Option<(i64, i64, String, Option<String>)> = sqlx::query_as(
            "SELECT b.user_id, b.school_id, u.role, u.model_preference \
             FROM chat_bindings b JOIN users u ON u.id = b.user_id \
             WHERE b.platform = ?1 AND b.external_chat_id = ?2",
        )
        .bind(platform.as_str())
        .bind(external_chat_id)
        .fetch_optional(&self.db)
        .await?;

        let Some((user_id, school_id, role, model_preference)) = row else {
            debug!(%platform, external_chat_id, "no binding for incoming chat");
            return Ok(None);
        };

        if school_id != tenant_hint {
            // Treated identically to "not found" so a stale binding cannot
            // route one tenant's messages through another tenant's bot.
            debug!(
                %platform,
                external_chat_id,
                bound_school = school_id,
                hinted_school = tenant_hint,
                "binding school does not match webhook tenant"
            );
            return Ok(None);
        }

        Ok(Some(ResolvedUser {
            user_id,
            school_id,
            role,
            model_preference: ModelPreference::from_db(model_preference.as_deref()),
        }))
    }
}
