//! AI backend dispatch.
//!
//! Defines the [`AiDispatcher`] trait, the query/preference types, and the
//! chunk stream contract consumed by the relay:
//!
//! - the stream is lazy, finite, and non-restartable;
//! - chunks become available incrementally, before the full answer exists;
//! - it is consumed exactly once;
//! - it ends either by running dry (success) or by yielding one `Err`
//!   item (the error marker), after which no further items follow.
//!
//! The production implementation is [`http::HttpAiDispatcher`].

use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

pub mod http;

/// Cloud vs on-premise inference, stored per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelPreference {
    /// Hosted model (product default).
    Cloud,
    /// School-local inference.
    Local,
}

impl ModelPreference {
    /// Wire/database identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Local => "local",
        }
    }

    /// Interpret the stored column value.
    ///
    /// `NULL` and unknown values fall back to [`ModelPreference::Cloud`]:
    /// the column is an explicit opt-in to local inference, so an unreadable
    /// value must not silently change where a query runs.
    pub fn from_db(value: Option<&str>) -> Self {
        match value {
            Some("local") => Self::Local,
            _ => Self::Cloud,
        }
    }
}

/// One streaming query to the AI backend.
///
/// Owned by the dispatcher for the lifetime of the query; everything in it
/// is pass-through context for the backend, including the model preference
/// (the dispatcher never picks a model itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiQuery {
    /// Internal user id.
    pub user_id: i64,
    /// Tenant the user belongs to.
    pub school_id: i64,
    /// User role (e.g. "student", "teacher").
    pub role: String,
    /// The question text.
    pub text: String,
    /// Cloud/local routing preference from the user profile.
    pub model_preference: ModelPreference,
}

/// Failure modes surfaced on the chunk stream.
///
/// All of these are recoverable at the relay level (one fallback message to
/// the user), never fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// The backend could not be reached at all.
    #[error("AI backend unreachable: {0}")]
    Unreachable(String),
    /// No chunk arrived within the configured window.
    #[error("AI backend timed out between chunks")]
    Timeout,
    /// The backend answered with an error status or malformed payload.
    #[error("AI backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// The incremental answer: text fragments, then end-of-stream or one error.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, AiError>> + Send>>;

/// Issues streaming queries to the AI backend.
#[async_trait]
pub trait AiDispatcher: Send + Sync {
    /// Start one query and return its chunk stream.
    ///
    /// Connection and protocol failures are reported on the stream, not
    /// here, so the caller has a single consumption path.
    async fn query(&self, query: AiQuery) -> ChunkStream;
}
