// ── Luma Engine: Generation Backend ────────────────────────────────────────
//
// The opaque text-generation collaborator. The engine only needs one
// operation: turn a role-tagged transcript plus an instruction preamble
// into a lazy, finite, non-restartable stream of raw response chunks.
// Parsing those chunks into text deltas is the pipeline's job, so the
// chunk boundaries coming out of here can fall anywhere — including mid
// line and mid JSON fragment.
//
// `HttpBackend` talks to any OpenAI-compatible SSE endpoint with the usual
// resilience: exponential backoff with jitter, Retry-After, a fixed set of
// retryable statuses, and auth errors never retried.

use crate::atoms::error::{BackendError, EngineResult};
use crate::atoms::types::{ChatTurn, TurnRole};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{error, info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, SystemTime};

/// Raw chunk stream as produced by a backend. Finite and non-restartable:
/// once the consumer stops pulling, the generation is abandoned.
pub type ChunkStream = BoxStream<'static, Result<String, BackendError>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Issue one generation request. The transcript is oldest-first; the
    /// preamble is rendered from the turn's Directive and sent as the
    /// system turn.
    async fn stream_chat(&self, turns: &[ChatTurn], preamble: &str) -> EngineResult<ChunkStream>;
}

// ── Retry utilities ────────────────────────────────────────────────────────

/// Maximum retry attempts for the initial request (the stream itself is
/// never retried mid-read; a broken stream surfaces to the pipeline).
pub const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Check if an HTTP status code represents a transient/retryable error.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

/// Parse a Retry-After header value (integer seconds only).
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    header_value.trim().parse::<u64>().ok()
}

/// Sleep with exponential backoff + ±25% jitter, respecting Retry-After.
/// Returns the actual delay for logging.
async fn retry_delay(attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let base_ms = INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt);
    let capped_ms = base_ms.min(MAX_RETRY_DELAY_MS);
    let delay_ms = if let Some(secs) = retry_after_secs {
        (secs.min(60) * 1000).max(capped_ms)
    } else {
        capped_ms
    };
    let jittered = apply_jitter(delay_ms);
    let delay = Duration::from_millis(jittered);
    tokio::time::sleep(delay).await;
    delay
}

/// Apply ±25% jitter to prevent thundering-herd effects.
fn apply_jitter(base_ms: u64) -> u64 {
    let jitter_range = (base_ms / 4) as i64;
    if jitter_range == 0 {
        return base_ms.max(100);
    }
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let offset = ((nanos % 1000) as i64 % (2 * jitter_range + 1)) - jitter_range;
    (base_ms as i64 + offset).max(100) as u64
}

// ── Byte-to-text chunk decoding ────────────────────────────────────────────

/// Incremental UTF-8 decoder for the byte chunks coming off the wire.
/// Chunk boundaries can fall inside a multi-byte character, so a trailing
/// incomplete sequence is held back and prepended to the next chunk instead
/// of being mangled into replacement characters. Genuinely invalid bytes
/// mid-chunk still decode lossily.
#[derive(Default)]
struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // The prefix is valid UTF-8, so this conversion is exact.
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete trailing sequence: keep it for the next chunk.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        // Invalid bytes: replace and keep scanning.
                        Some(n) => {
                            out.push('\u{FFFD}');
                            self.pending.drain(..valid + n);
                        }
                    }
                }
            }
        }
        out
    }
}

// ── HTTP backend ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f64>,
}

pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    fn format_turns(turns: &[ChatTurn], preamble: &str) -> Vec<Value> {
        let mut messages = vec![json!({ "role": "system", "content": preamble })];
        messages.extend(turns.iter().map(|t| {
            let role = match t.role {
                TurnRole::System => "system",
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            json!({ "role": role, "content": t.text })
        }));
        messages
    }

    /// Classify a non-success response into the backend taxonomy.
    fn classify(status: u16, message: String, retry_after: Option<u64>) -> BackendError {
        match status {
            401 | 403 => BackendError::Auth(message),
            402 => BackendError::QuotaExceeded { message },
            429 => BackendError::RateLimited { message, retry_after_secs: retry_after },
            _ => BackendError::Api { status, message },
        }
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn stream_chat(&self, turns: &[ChatTurn], preamble: &str) -> EngineResult<ChunkStream> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let mut body = json!({
            "model": self.config.model,
            "messages": Self::format_turns(turns, preamble),
            "stream": true,
        });
        if let Some(temp) = self.config.temperature {
            body["temperature"] = json!(temp);
        }

        info!("[engine] Generation request to {} model={}", url, self.config.model);

        let mut last_error = BackendError::Transport("request not attempted".into());
        let mut retry_after: Option<u64> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1, retry_after.take()).await;
                warn!(
                    "[engine] Backend retry {}/{} after {}ms",
                    attempt,
                    MAX_RETRIES,
                    delay.as_millis()
                );
            }

            let response = match self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = BackendError::Transport(format!("HTTP request failed: {e}"));
                    if attempt < MAX_RETRIES {
                        continue;
                    }
                    return Err(last_error.into());
                }
            };

            if !response.status().is_success() {
                let status = response.status().as_u16();
                retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body_text = response.text().await.unwrap_or_default();
                let detail: String = body_text.chars().take(200).collect();
                error!("[engine] Backend error {status}: {detail}");

                let classified = Self::classify(status, detail, retry_after);
                // Auth errors are never retried.
                if matches!(classified, BackendError::Auth(_)) {
                    return Err(classified.into());
                }
                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    last_error = classified;
                    continue;
                }
                return Err(classified.into());
            }

            let mut decoder = Utf8ChunkDecoder::default();
            let stream = response
                .bytes_stream()
                .map(move |result| {
                    result
                        .map(|bytes| decoder.decode(&bytes))
                        .map_err(|e| BackendError::Transport(format!("Stream read error: {e}")))
                })
                .boxed();
            return Ok(stream);
        }

        Err(last_error.into())
    }
}
