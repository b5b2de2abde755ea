// ── Luma Engine: Streaming Response Pipeline ───────────────────────────────
//
// One generation per user turn, consumed incrementally:
//
//   idle → sending → streaming → complete   (happy path)
//                              → error      (any failure)
//
// Invariants enforced here:
//   • At most one session may be sending/streaming per conversation; a
//     second send while one is in flight is rejected with `StillThinking`,
//     never silently interleaved into the same message.
//   • Exactly one assistant message per turn: the record is created on the
//     first non-empty delta and appended to afterwards, never replaced.
//   • Chunk boundaries are arbitrary — partial lines are buffered across
//     chunks, and an unterminated trailing JSON fragment is deferred to the
//     next chunk instead of being discarded or erroring.
//   • A stream that ends with zero deltas still produces a message: any
//     buffered text is flushed, otherwise a deterministic fallback goes out.
//   • On failure the in-flight lock is released and partial content is
//     preserved, so the next turn proceeds normally.

use crate::atoms::constants::FALLBACK_ASSISTANT_MESSAGE;
use crate::atoms::error::{BackendError, EngineError, EngineResult};
use crate::atoms::types::{ChatRecord, ChatTurn, Directive, Sender, StreamState};
use crate::engine::assembler::render_preamble;
use crate::engine::backend::ChatBackend;
use crate::engine::store::ConversationStore;
use chrono::Utc;
use futures::StreamExt;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

// ── Incremental delta parser ───────────────────────────────────────────────

enum LineOutcome {
    Delta(String),
    Done,
    Skip,
}

/// Pull-based parser over line-delimited response chunks.
///
/// Feed it raw chunks split at arbitrary byte boundaries; it hands back the
/// text deltas found in complete `data:` lines. Comment/keep-alive lines
/// (`:` prefix) and blank lines are ignored; a malformed complete line is
/// skipped rather than aborting the stream.
pub struct DeltaParser {
    pending: String,
    done: bool,
}

impl Default for DeltaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaParser {
    pub fn new() -> Self {
        Self { pending: String::new(), done: false }
    }

    /// The explicit end marker has been seen; no more deltas will come.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one raw chunk, returning the deltas completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.done {
            return deltas;
        }
        self.pending.push_str(chunk);

        while let Some(line_end) = self.pending.find('\n') {
            let line = self.pending[..line_end].to_string();
            self.pending.drain(..=line_end);

            match Self::parse_line(&line) {
                LineOutcome::Delta(d) => deltas.push(d),
                LineOutcome::Done => {
                    self.done = true;
                    self.pending.clear();
                    break;
                }
                LineOutcome::Skip => {}
            }
        }
        deltas
    }

    /// Drain whatever is left at stream end. An unterminated final data
    /// line that turned out to be complete JSON still yields its delta;
    /// anything else is dropped silently.
    pub fn finish(&mut self) -> Option<String> {
        if self.done || self.pending.trim().is_empty() {
            self.pending.clear();
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        match Self::parse_line(&line) {
            LineOutcome::Delta(d) => Some(d),
            _ => None,
        }
    }

    fn parse_line(line: &str) -> LineOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(':') {
            return LineOutcome::Skip; // keep-alive / comment
        }
        let Some(payload) = trimmed.strip_prefix("data:").map(str::trim) else {
            return LineOutcome::Skip; // event:/id:/anything else
        };
        if payload == "[DONE]" {
            return LineOutcome::Done;
        }
        let Ok(v) = serde_json::from_str::<serde_json::Value>(payload) else {
            // Malformed complete line — skip it, never abort the stream.
            return LineOutcome::Skip;
        };
        // Accept both the bare `{"delta": "..."}` shape and the
        // OpenAI-compatible `choices[0].delta.content` shape.
        let delta = v["delta"]
            .as_str()
            .or_else(|| v["choices"][0]["delta"]["content"].as_str());
        match delta {
            Some(d) if !d.is_empty() => LineOutcome::Delta(d.to_string()),
            _ => LineOutcome::Skip,
        }
    }
}

// ── Stream session ─────────────────────────────────────────────────────────

/// One turn's streaming lifecycle. Created at turn start, destroyed once
/// the assistant message is finalized.
pub struct StreamSession {
    pub id: Uuid,
    pub state: StreamState,
    /// Full text accumulated so far (mirrors the assistant record).
    pub buffer: String,
    parser: DeltaParser,
}

impl StreamSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: StreamState::Idle,
            buffer: String::new(),
            parser: DeltaParser::new(),
        }
    }
}

// ── Cancellation ───────────────────────────────────────────────────────────

/// User-initiated cancel for an in-flight turn. Cancelling closes the read
/// loop; text already streamed is kept as the final message content.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ── Send outcome ───────────────────────────────────────────────────────────

/// What one turn produced. On `Error` the conversation is already left in a
/// consistent state (lock released, partial content frozen); the caller
/// shows `backend_error.user_message()` and may retry per `retry_hint()`.
#[derive(Debug)]
pub struct SendOutcome {
    pub session_id: Uuid,
    pub state: StreamState,
    /// Id of the assistant record, when one was created.
    pub message_id: Option<Uuid>,
    /// Final assistant message text.
    pub text: String,
    pub backend_error: Option<BackendError>,
    pub cancelled: bool,
}

// ── Pipeline ───────────────────────────────────────────────────────────────

pub struct ResponsePipeline {
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn ConversationStore>,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases the conversation's in-flight slot on every exit path.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

impl ResponsePipeline {
    pub fn new(backend: Arc<dyn ChatBackend>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            backend,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Whether a generation is currently in flight for this conversation.
    pub fn is_in_flight(&self, conversation: &str) -> bool {
        self.in_flight.lock().contains(conversation)
    }

    fn acquire(&self, conversation: &str) -> EngineResult<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock();
        if !set.insert(conversation.to_string()) {
            return Err(EngineError::StillThinking { conversation: conversation.to_string() });
        }
        Ok(InFlightGuard { set: &self.in_flight, key: conversation.to_string() })
    }

    /// Run one turn: append the user record, issue the generation request,
    /// and update one assistant record incrementally until the stream ends.
    pub async fn send(
        &self,
        conversation: &str,
        utterance: &str,
        directive: &Directive,
        cancel: &CancelHandle,
    ) -> EngineResult<SendOutcome> {
        let _guard = self.acquire(conversation)?;

        self.store
            .append(conversation, ChatRecord::new(Sender::User, utterance, Utc::now()))?;

        let mut session = StreamSession::new();
        session.state = StreamState::Sending;

        let history = self.store.history(conversation);
        let turns: Vec<ChatTurn> = history.iter().map(ChatTurn::from).collect();
        let preamble = render_preamble(directive);

        let mut stream = match self.backend.stream_chat(&turns, &preamble).await {
            Ok(s) => s,
            Err(EngineError::Backend(e)) => {
                return Ok(self.fail_turn(conversation, session, e)?);
            }
            Err(other) => return Err(other),
        };
        session.state = StreamState::Streaming;

        let mut message_id: Option<Uuid> = None;
        let mut stream_error: Option<BackendError> = None;
        let mut cancelled = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[engine] Turn cancelled for conversation {conversation}");
                    cancelled = true;
                    break;
                }
                next = stream.next() => next,
            };
            let Some(result) = next else { break };

            match result {
                Ok(chunk) => {
                    for delta in session.parser.feed(&chunk) {
                        self.apply_delta(conversation, &mut session, &mut message_id, &delta)?;
                    }
                    if session.parser.is_done() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("[engine] Stream failed mid-read: {e}");
                    stream_error = Some(e);
                    break;
                }
            }
        }

        // Flush a complete-but-unterminated trailing data line.
        if stream_error.is_none() {
            if let Some(delta) = session.parser.finish() {
                self.apply_delta(conversation, &mut session, &mut message_id, &delta)?;
            }
        }

        if let Some(e) = stream_error {
            if let Some(id) = message_id {
                // Keep the partial text as the final content.
                self.store.freeze(conversation, id)?;
            }
            let mut outcome = self.fail_turn(conversation, session, e)?;
            if let Some(id) = message_id {
                outcome.message_id = Some(id);
            }
            return Ok(outcome);
        }

        // Zero deltas and nothing buffered: never leave the user in silence.
        if message_id.is_none() && !cancelled {
            let record =
                ChatRecord::new(Sender::Assistant, FALLBACK_ASSISTANT_MESSAGE, Utc::now());
            let id = record.id;
            self.store.append(conversation, record)?;
            session.buffer.push_str(FALLBACK_ASSISTANT_MESSAGE);
            message_id = Some(id);
        }

        if let Some(id) = message_id {
            self.store.freeze(conversation, id)?;
        }
        session.state = StreamState::Complete;

        Ok(SendOutcome {
            session_id: session.id,
            state: session.state,
            message_id,
            text: session.buffer,
            backend_error: None,
            cancelled,
        })
    }

    fn apply_delta(
        &self,
        conversation: &str,
        session: &mut StreamSession,
        message_id: &mut Option<Uuid>,
        delta: &str,
    ) -> EngineResult<()> {
        if delta.is_empty() {
            return Ok(());
        }
        match message_id {
            None => {
                let record = ChatRecord::new(Sender::Assistant, delta, Utc::now());
                *message_id = Some(record.id);
                self.store.append(conversation, record)?;
            }
            Some(id) => {
                self.store.append_content(conversation, *id, delta)?;
            }
        }
        session.buffer.push_str(delta);
        Ok(())
    }

    /// Common failure path: log the diagnostic, surface the one short
    /// recoverable message, leave the conversation consistent.
    fn fail_turn(
        &self,
        conversation: &str,
        mut session: StreamSession,
        error: BackendError,
    ) -> EngineResult<SendOutcome> {
        warn!("[engine] Turn failed for {conversation}: {error}");
        session.state = StreamState::Error;

        // If no partial message exists, the recoverable message becomes the
        // assistant record so the transcript never shows a silent gap.
        let message_id = if session.buffer.is_empty() {
            let record = ChatRecord::new(Sender::Assistant, error.user_message(), Utc::now());
            let id = record.id;
            self.store.append(conversation, record)?;
            self.store.freeze(conversation, id)?;
            session.buffer.push_str(error.user_message());
            Some(id)
        } else {
            None
        };

        Ok(SendOutcome {
            session_id: session.id,
            state: StreamState::Error,
            message_id,
            text: session.buffer,
            backend_error: Some(error),
            cancelled: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut DeltaParser, chunks: &[&str]) -> String {
        let mut out = String::new();
        for c in chunks {
            for d in parser.feed(c) {
                out.push_str(&d);
            }
        }
        if let Some(d) = parser.finish() {
            out.push_str(&d);
        }
        out
    }

    #[test]
    fn test_simple_data_lines() {
        let mut p = DeltaParser::new();
        let text = feed_all(
            &mut p,
            &["data: {\"delta\":\"Hello\"}\n", "data: {\"delta\":\", world\"}\n"],
        );
        assert_eq!(text, "Hello, world");
    }

    #[test]
    fn test_split_at_arbitrary_boundaries() {
        let full = "data: {\"delta\":\"Good \"}\ndata: {\"delta\":\"morning\"}\ndata: [DONE]\n";
        // Reconstructed text must be identical however the bytes are split.
        for split in 1..full.len() {
            let (a, b) = full.split_at(split);
            let mut p = DeltaParser::new();
            let text = feed_all(&mut p, &[a, b]);
            assert_eq!(text, "Good morning", "split at {split}");
            assert!(p.is_done());
        }
    }

    #[test]
    fn test_comment_and_keepalive_lines_ignored() {
        let mut p = DeltaParser::new();
        let text = feed_all(
            &mut p,
            &[": keep-alive\n\n", "event: message\n", "data: {\"delta\":\"hi\"}\n"],
        );
        assert_eq!(text, "hi");
    }

    #[test]
    fn test_unterminated_trailing_json_deferred_then_flushed() {
        let mut p = DeltaParser::new();
        // First chunk ends mid-JSON: nothing must come out yet.
        assert!(p.feed("data: {\"delta\":\"par").is_empty());
        // Next chunk completes the line.
        let deltas = p.feed("tial\"}\n");
        assert_eq!(deltas, vec!["partial".to_string()]);

        // A complete trailing line without a newline flushes at finish.
        let mut p = DeltaParser::new();
        assert!(p.feed("data: {\"delta\":\"tail\"}").is_empty());
        assert_eq!(p.finish().as_deref(), Some("tail"));
    }

    #[test]
    fn test_malformed_complete_line_is_skipped() {
        let mut p = DeltaParser::new();
        let text = feed_all(
            &mut p,
            &["data: {not json}\n", "data: {\"delta\":\"ok\"}\n"],
        );
        assert_eq!(text, "ok");
    }

    #[test]
    fn test_done_stops_further_deltas() {
        let mut p = DeltaParser::new();
        p.feed("data: [DONE]\n");
        assert!(p.is_done());
        assert!(p.feed("data: {\"delta\":\"late\"}\n").is_empty());
        assert!(p.finish().is_none());
    }

    #[test]
    fn test_openai_compatible_shape() {
        let mut p = DeltaParser::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"nested\"}}]}\n";
        assert_eq!(p.feed(line), vec!["nested".to_string()]);
    }

    #[test]
    fn test_cancel_handle_flags() {
        let h = CancelHandle::new();
        assert!(!h.is_cancelled());
        h.cancel();
        assert!(h.is_cancelled());
    }
}
