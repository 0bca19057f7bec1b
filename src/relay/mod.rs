//! Relay orchestration.
//!
//! One [`Relay`] ties the platform adapters, identity resolver, credential
//! store, AI dispatcher, and auditor together. Per inbound update the flow
//! is decode → resolve identity → resolve credential → typing indicator →
//! AI dispatch → stream relay, with every exit path a [`RelayOutcome`]:
//!
//! - resolution misses end in `Unmatched` — silent for the sender (an
//!   anti-enumeration measure, unregistered chats learn nothing), audited
//!   for the operator;
//! - an AI stream failure ends in `AiFailed` after exactly one short
//!   fallback message to the chat;
//! - platform send failures are logged and counted, never escalated.
//!
//! Nothing here ever propagates an error to the webhook response; the
//! caller acks the platform unconditionally once [`Relay::accept`] returns.
//!
//! Ordering: updates for the same chat are processed to completion in
//! arrival order through [`ordering::ChatQueues`]; distinct chats run
//! concurrently on their own tokio tasks.

use std::sync::Arc;

use chrono::Utc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ai::{AiDispatcher, AiQuery, ChunkStream};
use crate::audit::{AuditReason, Auditor, InteractionLogEntry};
use crate::credentials::CredentialStore;
use crate::identity::{IdentityResolver, ResolvedUser};
use crate::platforms::{DecodeError, PlatformAdapter};
use crate::types::{ChatKey, InboundMessage, Platform};

pub mod ordering;

use ordering::ChatQueues;

/// The one message a chat user ever sees on an AI failure.
pub const FALLBACK_TEXT: &str =
    "متأسفم، الان نمی‌توانم پاسخ بدهم. لطفاً چند دقیقه دیگر دوباره تلاش کنید.";

/// Hard per-message character limit shared by both platforms.
const MESSAGE_CHAR_LIMIT: usize = 4096;

/// Coalescing threshold: buffered chunks are flushed to the chat once the
/// buffer reaches this many characters.
const FLUSH_THRESHOLD_CHARS: usize = 3000;

/// Cap on raw payload bytes copied into decode-failure audit entries.
const AUDIT_RAW_LIMIT_CHARS: usize = 500;

/// Terminal state of one update's processing.
#[derive(Debug)]
pub enum RelayOutcome {
    /// The AI answer was relayed to the chat.
    Delivered {
        /// Chunks consumed from the AI stream.
        chunks: usize,
        /// Outbound messages the platform accepted.
        sends: usize,
        /// Outbound messages the platform rejected (logged, not retried).
        send_failures: usize,
    },
    /// No binding or no credential; nothing was sent, one audit entry made.
    Unmatched(AuditReason),
    /// The AI stream failed; one fallback message was sent.
    AiFailed {
        /// Chunks consumed before the error marker.
        chunks: usize,
    },
}

struct RelayInner {
    bale: Arc<dyn PlatformAdapter>,
    eitaa: Arc<dyn PlatformAdapter>,
    resolver: Arc<dyn IdentityResolver>,
    credentials: Arc<dyn CredentialStore>,
    dispatcher: Arc<dyn AiDispatcher>,
    auditor: Arc<dyn Auditor>,
    queues: ChatQueues,
}

/// The relay orchestrator: a cheap-clone handle shared by the webhook
/// handlers and the per-chat worker tasks. All collaborators are injected
/// at construction so tests can substitute fakes.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl Relay {
    /// Wire a relay from its collaborators.
    pub fn new(
        bale: Arc<dyn PlatformAdapter>,
        eitaa: Arc<dyn PlatformAdapter>,
        resolver: Arc<dyn IdentityResolver>,
        credentials: Arc<dyn CredentialStore>,
        dispatcher: Arc<dyn AiDispatcher>,
        auditor: Arc<dyn Auditor>,
    ) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                bale,
                eitaa,
                resolver,
                credentials,
                dispatcher,
                auditor,
                queues: ChatQueues::new(),
            }),
        }
    }

    fn adapter(&self, platform: Platform) -> &Arc<dyn PlatformAdapter> {
        match platform {
            Platform::Bale => &self.inner.bale,
            Platform::Eitaa => &self.inner.eitaa,
        }
    }

    /// Accept one raw webhook payload for processing.
    ///
    /// Decodes the payload, queues the update on its chat, and returns.
    /// Never fails from the caller's point of view: decode errors are
    /// audited and dropped here, and downstream outcomes are handled on the
    /// chat's worker task. The webhook handler acks after this returns.
    pub async fn accept(&self, platform: Platform, tenant_hint: i64, raw: &[u8]) {
        let decoded = match self.adapter(platform).decode(raw) {
            Ok(update) => update,
            Err(e) => {
                let reason = match e {
                    DecodeError::Malformed(_) => AuditReason::MalformedUpdate,
                    DecodeError::Empty => AuditReason::EmptyUpdate,
                };
                debug!(%platform, tenant_hint, error = %e, "dropping undecodable update");
                self.inner
                    .auditor
                    .record(InteractionLogEntry {
                        platform,
                        external_chat_id: String::new(),
                        raw_text: truncate_chars(
                            &String::from_utf8_lossy(raw),
                            AUDIT_RAW_LIMIT_CHARS,
                        ),
                        reason,
                        timestamp: Utc::now(),
                    })
                    .await;
                return;
            }
        };

        let msg = InboundMessage {
            platform,
            tenant_hint,
            external_chat_id: decoded.external_chat_id,
            raw_text: decoded.text,
            received_at: Utc::now(),
        };
        let key = ChatKey::of(&msg);

        if self.inner.queues.enqueue(&key, msg) {
            let relay = self.clone();
            tokio::spawn(async move {
                relay.drain(key).await;
            });
        }
    }

    /// Drain one chat's queue to completion, one update at a time.
    async fn drain(&self, key: ChatKey) {
        while let Some(msg) = self.inner.queues.next(&key) {
            let outcome = self.process(msg).await;
            match &outcome {
                RelayOutcome::Delivered {
                    chunks,
                    sends,
                    send_failures,
                } => info!(chat = %key, chunks, sends, send_failures, "update relayed"),
                RelayOutcome::Unmatched(reason) => {
                    info!(chat = %key, %reason, "update dropped as unmatched")
                }
                RelayOutcome::AiFailed { chunks } => {
                    warn!(chat = %key, chunks, "AI stream failed, fallback sent")
                }
            }
        }
    }

    /// Process a single decoded update through to its terminal state.
    ///
    /// Exposed for integration testing with fake collaborators; production
    /// traffic goes through [`Relay::accept`] for per-chat ordering.
    #[doc(hidden)]
    pub async fn process(&self, msg: InboundMessage) -> RelayOutcome {
        let trace_id = Uuid::new_v4();

        let user = match self
            .inner
            .resolver
            .resolve(msg.platform, &msg.external_chat_id, msg.tenant_hint)
            .await
        {
            Ok(Some(user)) => user,
            Ok(None) => {
                return self.unmatched(&msg, AuditReason::UnmatchedUser).await;
            }
            Err(e) => {
                // A broken store degrades to "silent drop plus audit",
                // never to a webhook failure.
                warn!(%trace_id, error = %e, "binding store failed, treating as unmatched");
                return self.unmatched(&msg, AuditReason::UnmatchedUser).await;
            }
        };

        let token = match self
            .inner
            .credentials
            .token(user.school_id, msg.platform)
            .await
        {
            Ok(Some(token)) => token,
            Ok(None) => {
                return self.unmatched(&msg, AuditReason::MissingBotToken).await;
            }
            Err(e) => {
                warn!(%trace_id, error = %e, "credential store failed, treating as unmatched");
                return self.unmatched(&msg, AuditReason::MissingBotToken).await;
            }
        };

        let adapter = Arc::clone(self.adapter(msg.platform));

        // Best-effort: a missing typing indicator is cosmetic.
        if let Err(e) = adapter.send_typing(&token, &msg.external_chat_id).await {
            debug!(%trace_id, error = %e, "typing indicator failed (ignored)");
        }

        let stream = self.inner.dispatcher.query(build_query(&user, &msg)).await;
        info!(
            %trace_id,
            user_id = user.user_id,
            school_id = user.school_id,
            model = user.model_preference.as_str(),
            "AI query dispatched"
        );

        self.relay_answer(adapter.as_ref(), &token, &msg.external_chat_id, stream, trace_id)
            .await
    }

    /// Consume the chunk stream, coalescing chunks into bounded messages.
    ///
    /// Guarantees that the concatenation of everything sent equals the
    /// concatenation of the stream's chunks for a successful stream, and
    /// that an error marker yields exactly one fallback message.
    async fn relay_answer(
        &self,
        adapter: &dyn PlatformAdapter,
        token: &str,
        chat_id: &str,
        mut stream: ChunkStream,
        trace_id: Uuid,
    ) -> RelayOutcome {
        let mut buffer = String::new();
        let mut chunks: usize = 0;
        let mut sends: usize = 0;
        let mut send_failures: usize = 0;

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    chunks = chunks.saturating_add(1);
                    buffer.push_str(&chunk);
                    if buffer.chars().count() >= FLUSH_THRESHOLD_CHARS {
                        flush(adapter, token, chat_id, &mut buffer, &mut sends, &mut send_failures)
                            .await;
                    }
                }
                Err(e) => {
                    warn!(
                        %trace_id,
                        error = %e,
                        buffered_chars = buffer.chars().count(),
                        "AI stream error, sending fallback"
                    );
                    if let Err(send_err) = adapter.send_text(token, chat_id, FALLBACK_TEXT).await {
                        warn!(%trace_id, error = %send_err, "fallback message send failed");
                    }
                    return RelayOutcome::AiFailed { chunks };
                }
            }
        }

        if !buffer.is_empty() {
            flush(adapter, token, chat_id, &mut buffer, &mut sends, &mut send_failures).await;
        }

        RelayOutcome::Delivered {
            chunks,
            sends,
            send_failures,
        }
    }

    async fn unmatched(&self, msg: &InboundMessage, reason: AuditReason) -> RelayOutcome {
        self.inner
            .auditor
            .record(InteractionLogEntry {
                platform: msg.platform,
                external_chat_id: msg.external_chat_id.clone(),
                raw_text: msg.raw_text.clone(),
                reason,
                timestamp: msg.received_at,
            })
            .await;
        RelayOutcome::Unmatched(reason)
    }
}

/// Send the buffered text, split at the platform message limit.
///
/// Send failures are logged and counted; the update still completes.
async fn flush(
    adapter: &dyn PlatformAdapter,
    token: &str,
    chat_id: &str,
    buffer: &mut String,
    sends: &mut usize,
    send_failures: &mut usize,
) {
    for piece in split_message(buffer, MESSAGE_CHAR_LIMIT) {
        match adapter.send_text(token, chat_id, &piece).await {
            Ok(()) => *sends = sends.saturating_add(1),
            Err(e) => {
                warn!(chat_id, error = %e, "outbound send failed");
                *send_failures = send_failures.saturating_add(1);
            }
        }
    }
    buffer.clear();
}

fn build_query(user: &ResolvedUser, msg: &InboundMessage) -> AiQuery {
    AiQuery {
        user_id: user.user_id,
        school_id: user.school_id,
        role: user.role.clone(),
        text: msg.raw_text.clone(),
        model_preference: user.model_preference,
    }
}

/// Split text into pieces of at most `limit` characters, on char
/// boundaries.
#[doc(hidden)]
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut count: usize = 0;
    for ch in text.chars() {
        if count >= limit {
            pieces.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count = count.saturating_add(1);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
