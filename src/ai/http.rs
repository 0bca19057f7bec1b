//! HTTP implementation of the AI dispatcher.
//!
//! Speaks line-delimited JSON streaming against the backend's `/v1/chat`
//! endpoint: the request carries the resolved user context and the response
//! body is a sequence of `{"delta": "...", "done": false}` lines closed by
//! a `{"done": true}` marker. Chunks are forwarded to the consumer as they
//! arrive so the relay can start answering before the model finishes.
//!
//! A single timeout bounds the wait for the initial response and for every
//! gap between chunks; when it fires the stream yields
//! [`AiError::Timeout`] and ends. Partial output already forwarded stands.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use super::{AiDispatcher, AiError, AiQuery, ChunkStream};

/// Buffered chunks between the network task and the consumer.
const CHANNEL_CAPACITY: usize = 32;

/// Cap on error bodies copied into [`AiError::InvalidResponse`].
const MAX_ERROR_BODY_CHARS: usize = 256;

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Chat request body sent to the backend.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    /// Internal user id.
    pub user_id: i64,
    /// Tenant id.
    pub school_id: i64,
    /// User role.
    pub role: String,
    /// Question text.
    pub text: String,
    /// "cloud" or "local".
    pub model: String,
    /// Always true; the relay only consumes streamed answers.
    pub stream: bool,
}

/// One line of the streamed response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct StreamLine {
    /// Text fragment, absent on the final marker line.
    pub delta: Option<String>,
    /// True on the final marker line.
    #[serde(default)]
    pub done: bool,
    /// Backend-reported failure, mutually exclusive with `delta`.
    pub error: Option<String>,
}

/// Parsed meaning of one stream line.
#[doc(hidden)]
#[derive(Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// A text fragment.
    Delta(String),
    /// End-of-stream marker.
    Done,
}

/// Build the backend request for a query.
#[doc(hidden)]
pub fn build_request(query: &AiQuery) -> ChatRequest {
    ChatRequest {
        user_id: query.user_id,
        school_id: query.school_id,
        role: query.role.clone(),
        text: query.text.clone(),
        model: query.model_preference.as_str().to_owned(),
        stream: true,
    }
}

/// Parse one non-empty line of the streamed body.
///
/// # Errors
///
/// Returns [`AiError::InvalidResponse`] on unparseable JSON, on a
/// backend-reported error line, and on a line carrying neither a delta nor
/// the done marker.
#[doc(hidden)]
pub fn parse_stream_line(line: &str) -> Result<StreamEvent, AiError> {
    let parsed: StreamLine = serde_json::from_str(line)
        .map_err(|e| AiError::InvalidResponse(format!("bad stream line: {e}")))?;

    if let Some(message) = parsed.error {
        return Err(AiError::InvalidResponse(message));
    }
    if parsed.done {
        return Ok(StreamEvent::Done);
    }
    match parsed.delta {
        Some(delta) => Ok(StreamEvent::Delta(delta)),
        None => Err(AiError::InvalidResponse(
            "stream line carries neither delta nor done".to_owned(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Dispatcher speaking NDJSON streaming over HTTP.
pub struct HttpAiDispatcher {
    endpoint: String,
    chunk_timeout: Duration,
    client: reqwest::Client,
}

impl HttpAiDispatcher {
    /// Create a dispatcher for the backend at `endpoint`.
    ///
    /// `chunk_timeout` bounds the wait for the initial response and for
    /// every inter-chunk gap.
    pub fn new(endpoint: String, chunk_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            chunk_timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl AiDispatcher for HttpAiDispatcher {
    async fn query(&self, query: AiQuery) -> ChunkStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let url = format!("{}/v1/chat", self.endpoint);
        let request = build_request(&query);
        let client = self.client.clone();
        let chunk_timeout = self.chunk_timeout;

        tokio::spawn(async move {
            run_query(client, url, request, chunk_timeout, tx).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

/// Drive one backend request, forwarding chunks until done/error/hangup.
///
/// Dropping the receiver cancels the query: the next forward fails and the
/// task returns, dropping the HTTP response mid-body.
async fn run_query(
    client: reqwest::Client,
    url: String,
    request: ChatRequest,
    chunk_timeout: Duration,
    tx: mpsc::Sender<Result<String, AiError>>,
) {
    let response = match timeout(chunk_timeout, client.post(&url).json(&request).send()).await {
        Err(_) => {
            let _ = tx.send(Err(AiError::Timeout)).await;
            return;
        }
        Ok(Err(e)) => {
            let _ = tx.send(Err(AiError::Unreachable(e.to_string()))).await;
            return;
        }
        Ok(Ok(response)) => response,
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        let _ = tx
            .send(Err(AiError::InvalidResponse(format!(
                "status {}: {truncated}",
                status.as_u16()
            ))))
            .await;
        return;
    }

    let mut body = Box::pin(response.bytes_stream());
    // Byte buffer, not a string: chunk boundaries can split multi-byte
    // UTF-8 sequences and the answers are mostly Persian.
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let chunk = match timeout(chunk_timeout, body.next()).await {
            Err(_) => {
                let _ = tx.send(Err(AiError::Timeout)).await;
                return;
            }
            Ok(Some(Err(e))) => {
                let _ = tx.send(Err(AiError::Unreachable(e.to_string()))).await;
                return;
            }
            Ok(Some(Ok(bytes))) => bytes,
            Ok(None) => {
                // Upstream closed; a final unterminated line may still hold
                // the done marker.
                if let Some(event) = drain_final_line(&buffer, &tx).await {
                    if event == StreamEvent::Done {
                        return;
                    }
                }
                let _ = tx
                    .send(Err(AiError::InvalidResponse(
                        "stream ended without completion marker".to_owned(),
                    )))
                    .await;
                return;
            }
        };

        buffer.extend_from_slice(&chunk);
        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
            let Some(line) = utf8_line(&line_bytes) else {
                let _ = tx
                    .send(Err(AiError::InvalidResponse(
                        "stream line is not valid UTF-8".to_owned(),
                    )))
                    .await;
                return;
            };
            if line.is_empty() {
                continue;
            }
            match parse_stream_line(line) {
                Ok(StreamEvent::Delta(delta)) => {
                    if tx.send(Ok(delta)).await.is_err() {
                        debug!("chunk consumer gone, cancelling AI query");
                        return;
                    }
                }
                Ok(StreamEvent::Done) => return,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }
}

/// Decode a buffered line, trimming the newline and surrounding whitespace.
fn utf8_line(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok().map(str::trim)
}

/// Process a final unterminated line after upstream close.
///
/// Returns the parsed event when the leftover bytes held one; delta events
/// are forwarded before returning.
async fn drain_final_line(
    buffer: &[u8],
    tx: &mpsc::Sender<Result<String, AiError>>,
) -> Option<StreamEvent> {
    let line = utf8_line(buffer)?;
    if line.is_empty() {
        return None;
    }
    match parse_stream_line(line) {
        Ok(StreamEvent::Delta(delta)) => {
            let _ = tx.send(Ok(delta.clone())).await;
            Some(StreamEvent::Delta(delta))
        }
        Ok(StreamEvent::Done) => Some(StreamEvent::Done),
        Err(_) => None,
    }
}
