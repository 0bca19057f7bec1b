//! Fake collaborators for relay tests.
//!
//! Every external seam of the orchestrator (adapters, resolver,
//! credentials, dispatcher, auditor) gets an in-memory stand-in that
//! records what the relay did to it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use peyk::ai::{AiDispatcher, AiError, AiQuery, ChunkStream, ModelPreference};
use peyk::audit::{Auditor, InteractionLogEntry};
use peyk::credentials::{CredentialError, CredentialStore};
use peyk::identity::{IdentityResolver, ResolveError, ResolvedUser};
use peyk::platforms::{DecodeError, DecodedUpdate, PlatformAdapter, SendError};
use peyk::relay::Relay;
use peyk::types::{InboundMessage, Platform};

/// One outbound call recorded by a fake adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendEvent {
    Typing { chat: String },
    Text { chat: String, text: String },
}

/// Adapter decoding a minimal `{"chat": "...", "text": "..."}` payload and
/// recording every outbound call.
pub struct FakeAdapter {
    pub sent: Arc<Mutex<Vec<SendEvent>>>,
    pub fail_sends: bool,
}

#[async_trait]
impl PlatformAdapter for FakeAdapter {
    fn decode(&self, raw: &[u8]) -> Result<DecodedUpdate, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let chat = value.get("chat").and_then(|v| v.as_str()).unwrap_or_default();
        let text = value.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        if chat.is_empty() || text.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(DecodedUpdate {
            external_chat_id: chat.to_owned(),
            text: text.to_owned(),
        })
    }

    async fn send_typing(&self, _token: &str, chat_id: &str) -> Result<(), SendError> {
        self.record(SendEvent::Typing {
            chat: chat_id.to_owned(),
        });
        if self.fail_sends {
            return Err(SendError::Network("fake typing failure".to_owned()));
        }
        Ok(())
    }

    async fn send_text(&self, _token: &str, chat_id: &str, text: &str) -> Result<(), SendError> {
        self.record(SendEvent::Text {
            chat: chat_id.to_owned(),
            text: text.to_owned(),
        });
        if self.fail_sends {
            return Err(SendError::Network("fake send failure".to_owned()));
        }
        Ok(())
    }
}

impl FakeAdapter {
    fn record(&self, event: SendEvent) {
        lock(&self.sent).push(event);
    }
}

/// Resolver with a fixed answer (or a fixed failure).
pub struct FakeResolver {
    pub user: Option<ResolvedUser>,
    pub fail: bool,
}

#[async_trait]
impl IdentityResolver for FakeResolver {
    async fn resolve(
        &self,
        _platform: Platform,
        _external_chat_id: &str,
        tenant_hint: i64,
    ) -> Result<Option<ResolvedUser>, ResolveError> {
        if self.fail {
            return Err(ResolveError::Store(sqlx::Error::PoolClosed));
        }
        Ok(self
            .user
            .clone()
            .filter(|user| user.school_id == tenant_hint))
    }
}

/// Credential store with a fixed token (or a fixed failure).
pub struct FakeCredentials {
    pub token: Option<String>,
    pub fail: bool,
}

#[async_trait]
impl CredentialStore for FakeCredentials {
    async fn token(
        &self,
        _school_id: i64,
        _platform: Platform,
    ) -> Result<Option<String>, CredentialError> {
        if self.fail {
            return Err(CredentialError::Store(sqlx::Error::PoolClosed));
        }
        Ok(self.token.clone())
    }
}

/// One scripted AI answer: an optional first-chunk delay plus the items
/// the stream yields.
pub struct Script {
    pub delay: Duration,
    pub items: Vec<Result<String, AiError>>,
}

impl Script {
    pub fn chunks(items: &[&str]) -> Self {
        Self {
            delay: Duration::ZERO,
            items: items.iter().map(|s| Ok((*s).to_owned())).collect(),
        }
    }

    pub fn delayed(delay_ms: u64, items: &[&str]) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            items: items.iter().map(|s| Ok((*s).to_owned())).collect(),
        }
    }

    pub fn error(error: AiError) -> Self {
        Self {
            delay: Duration::ZERO,
            items: vec![Err(error)],
        }
    }
}

/// Dispatcher replaying scripts, recording the queries.
///
/// Scripts keyed by question text win over the sequential list; keying
/// keeps concurrent tests deterministic when worker spawn order races.
pub struct ScriptedDispatcher {
    scripts: Mutex<VecDeque<Script>>,
    keyed: Mutex<std::collections::HashMap<String, Script>>,
    pub queries: Arc<Mutex<Vec<AiQuery>>>,
}

impl ScriptedDispatcher {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            keyed: Mutex::new(std::collections::HashMap::new()),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn keyed(scripts: Vec<(&str, Script)>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            keyed: Mutex::new(
                scripts
                    .into_iter()
                    .map(|(text, script)| (text.to_owned(), script))
                    .collect(),
            ),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl AiDispatcher for ScriptedDispatcher {
    async fn query(&self, query: AiQuery) -> ChunkStream {
        let text = query.text.clone();
        lock(&self.queries).push(query);
        let script = lock(&self.keyed)
            .remove(&text)
            .or_else(|| lock(&self.scripts).pop_front())
            .unwrap_or(Script {
                delay: Duration::ZERO,
                items: Vec::new(),
            });

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }
            for item in script.items {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });
        Box::pin(ReceiverStream::new(rx))
    }
}

/// Auditor recording entries in memory.
pub struct RecordingAuditor {
    pub entries: Arc<Mutex<Vec<InteractionLogEntry>>>,
}

#[async_trait]
impl Auditor for RecordingAuditor {
    async fn record(&self, entry: InteractionLogEntry) {
        lock(&self.entries).push(entry);
    }
}

/// Everything a relay test needs to observe.
pub struct Harness {
    pub relay: Relay,
    pub sent: Arc<Mutex<Vec<SendEvent>>>,
    pub audits: Arc<Mutex<Vec<InteractionLogEntry>>>,
    pub queries: Arc<Mutex<Vec<AiQuery>>>,
}

/// Wire a relay from fakes. Both platform slots share one event log so
/// tests observe global send order.
pub fn harness(
    user: Option<ResolvedUser>,
    token: Option<&str>,
    scripts: Vec<Script>,
) -> Harness {
    harness_with(
        FakeResolver { user, fail: false },
        FakeCredentials {
            token: token.map(str::to_owned),
            fail: false,
        },
        scripts,
        false,
    )
}

pub fn harness_with(
    resolver: FakeResolver,
    credentials: FakeCredentials,
    scripts: Vec<Script>,
    fail_sends: bool,
) -> Harness {
    harness_from(resolver, credentials, ScriptedDispatcher::new(scripts), fail_sends)
}

/// Wire a relay around keyed scripts (deterministic under concurrency).
pub fn harness_keyed(
    user: Option<ResolvedUser>,
    token: Option<&str>,
    scripts: Vec<(&str, Script)>,
) -> Harness {
    harness_from(
        FakeResolver { user, fail: false },
        FakeCredentials {
            token: token.map(str::to_owned),
            fail: false,
        },
        ScriptedDispatcher::keyed(scripts),
        false,
    )
}

fn harness_from(
    resolver: FakeResolver,
    credentials: FakeCredentials,
    dispatcher: ScriptedDispatcher,
    fail_sends: bool,
) -> Harness {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let queries = Arc::clone(&dispatcher.queries);
    let audits = Arc::new(Mutex::new(Vec::new()));

    let relay = Relay::new(
        Arc::new(FakeAdapter {
            sent: Arc::clone(&sent),
            fail_sends,
        }),
        Arc::new(FakeAdapter {
            sent: Arc::clone(&sent),
            fail_sends,
        }),
        Arc::new(resolver),
        Arc::new(credentials),
        Arc::new(dispatcher),
        Arc::new(RecordingAuditor {
            entries: Arc::clone(&audits),
        }),
    );

    Harness {
        relay,
        sent,
        audits,
        queries,
    }
}

/// A registered student at the given school.
pub fn student(school_id: i64) -> ResolvedUser {
    ResolvedUser {
        user_id: 7,
        school_id,
        role: "student".to_owned(),
        model_preference: ModelPreference::Cloud,
    }
}

/// A decoded inbound message on Bale.
pub fn inbound(chat: &str, text: &str, tenant_hint: i64) -> InboundMessage {
    InboundMessage {
        platform: Platform::Bale,
        tenant_hint,
        external_chat_id: chat.to_owned(),
        raw_text: text.to_owned(),
        received_at: Utc::now(),
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Lock a mutex, ignoring poisoning (test panics already failed the test).
pub fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
