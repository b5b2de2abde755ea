// ═══════════════════════════════════════════════════════════════════════════
// Luma Engine — integration tests
// ═══════════════════════════════════════════════════════════════════════════
//
// End-to-end paths through the public API: signal extraction → assembler →
// streaming pipeline → conversation store, with scripted backends standing
// in for the generation service.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use futures::StreamExt;
use luma_engine::engine::assembler::assemble;
use luma_engine::engine::journey::JourneyState;
use luma_engine::engine::recovery::RecoveryState;
use luma_engine::{
    BackendError, CancelHandle, ChatBackend, ChatTurn, ChunkStream, Companion, ConversationStore,
    Directive, EngineError, EngineResult, FeatureHint, IntentConfidence, IntentKind, MemoryStore,
    Persona, ResponseLength, ResponsePipeline, RetryHint, Sender, SituationalFacts, StreamState,
    ToneAdaptation, TurnSignals, Urgency,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

// ── Scripted backends ──────────────────────────────────────────────────────

/// Replays a fixed chunk script on every request.
struct ScriptedBackend {
    chunks: Vec<Result<String, BackendError>>,
}

impl ScriptedBackend {
    fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| Ok(c.to_string())).collect(),
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, _turns: &[ChatTurn], _preamble: &str) -> EngineResult<ChunkStream> {
        Ok(futures::stream::iter(self.chunks.clone()).boxed())
    }
}

/// Fails every request with a fixed classified error.
struct FailingBackend {
    error: BackendError,
}

#[async_trait]
impl ChatBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn stream_chat(&self, _turns: &[ChatTurn], _preamble: &str) -> EngineResult<ChunkStream> {
        Err(self.error.clone().into())
    }
}

/// Streams whatever the test pushes through a channel; the stream stays open
/// until the sender is dropped, so turns can be held in flight on purpose.
struct GatedBackend {
    rx: Mutex<Option<tokio::sync::mpsc::Receiver<Result<String, BackendError>>>>,
}

impl GatedBackend {
    fn new() -> (Self, tokio::sync::mpsc::Sender<Result<String, BackendError>>) {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        (Self { rx: Mutex::new(Some(rx)) }, tx)
    }
}

#[async_trait]
impl ChatBackend for GatedBackend {
    fn name(&self) -> &str {
        "gated"
    }

    async fn stream_chat(&self, _turns: &[ChatTurn], _preamble: &str) -> EngineResult<ChunkStream> {
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| EngineError::Other("gated backend already consumed".into()))?;
        Ok(ReceiverStream::new(rx).boxed())
    }
}

fn plain_directive() -> Directive {
    Directive {
        dominant_persona: Persona::Companion,
        response_length: ResponseLength::Medium,
        emotional_priority_override: false,
        tone: ToneAdaptation::Neutral,
        feature_hint: None,
        suggestion_quota: 1,
        situational: SituationalFacts::default(),
    }
}

async fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

// ── Signal → Directive end-to-end ──────────────────────────────────────────

#[test]
fn test_clear_reminder_turn() {
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap();
    let signals = TurnSignals::extract("Remind me to call mom in 10 minutes", &[], now);

    assert_eq!(signals.intent.kind, IntentKind::Reminder);
    assert_eq!(signals.intent.confidence, IntentConfidence::Clear);
    assert_eq!(signals.intent.urgency, Urgency::Soon);
    assert_eq!(signals.intent.sub_action.as_deref(), Some("call mom"));

    let d = assemble(
        &signals,
        &RecoveryState::default(),
        &JourneyState::default(),
        SituationalFacts::default(),
    );
    assert_eq!(d.feature_hint, Some(FeatureHint::Reminder));
    assert_eq!(d.response_length, ResponseLength::Short);
    assert!(!d.emotional_priority_override);
}

#[test]
fn test_stressed_turn_triggers_emotional_override() {
    let now = Utc::now();
    let signals = TurnSignals::extract("I'm so stressed, deadline tomorrow", &[], now);

    assert!(signals.emotion.confidence >= 0.7, "got {:?}", signals.emotion);
    assert!(signals.stress.is_some(), "deadline language must emit a stress signal");

    let d = assemble(
        &signals,
        &RecoveryState::default(),
        &JourneyState::default(),
        SituationalFacts::default(),
    );
    assert!(d.emotional_priority_override);
    assert_eq!(d.response_length, ResponseLength::Short);
    assert!(d.feature_hint.is_none(), "no productivity hints under override");
    assert_eq!(d.suggestion_quota, 0);
    assert!(matches!(d.tone, ToneAdaptation::Calm | ToneAdaptation::Supportive));
}

// ── Streaming pipeline ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_streamed_text_identical_regardless_of_chunk_boundaries() {
    let script = "data: {\"delta\":\"Good \"}\ndata: {\"delta\":\"morning, \"}\ndata: {\"delta\":\"Dana!\"}\ndata: [DONE]\n";

    // Whole script at once vs. split mid-line and mid-JSON.
    let splits: Vec<Vec<&str>> = vec![
        vec![script],
        vec![&script[..10], &script[10..35], &script[35..]],
        vec![&script[..27], &script[27..28], &script[28..]],
    ];

    let mut texts = Vec::new();
    for chunks in &splits {
        let store = Arc::new(MemoryStore::new());
        let pipeline = ResponsePipeline::new(
            Arc::new(ScriptedBackend::new(chunks)),
            store.clone(),
        );
        let outcome = pipeline
            .send("c1", "hello", &plain_directive(), &CancelHandle::new())
            .await
            .expect("turn should complete");
        assert_eq!(outcome.state, StreamState::Complete);
        texts.push(outcome.text);
    }
    assert!(texts.iter().all(|t| t == "Good morning, Dana!"), "got {texts:?}");
}

#[tokio::test]
async fn test_one_user_and_one_assistant_record_per_turn() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = ResponsePipeline::new(
        Arc::new(ScriptedBackend::new(&["data: {\"delta\":\"hey\"}\ndata: [DONE]\n"])),
        store.clone(),
    );
    pipeline
        .send("c1", "hi there", &plain_directive(), &CancelHandle::new())
        .await
        .expect("turn should complete");

    let history = store.history("c1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sender, Sender::User);
    assert_eq!(history[0].content, "hi there");
    assert_eq!(history[1].sender, Sender::Assistant);
    assert_eq!(history[1].content, "hey");
    assert!(history[1].frozen, "assistant record must be frozen after the turn");
}

#[tokio::test]
async fn test_zero_delta_stream_yields_fallback_message() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = ResponsePipeline::new(
        Arc::new(ScriptedBackend::new(&[": keep-alive\n", "data: [DONE]\n"])),
        store.clone(),
    );
    let outcome = pipeline
        .send("c1", "hello?", &plain_directive(), &CancelHandle::new())
        .await
        .expect("turn should complete");

    assert_eq!(outcome.state, StreamState::Complete);
    assert!(!outcome.text.is_empty(), "the user must never get silence");
    let history = store.history("c1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, outcome.text);
}

#[tokio::test]
async fn test_trailing_unterminated_line_is_flushed_at_stream_end() {
    let store = Arc::new(MemoryStore::new());
    // No trailing newline, no [DONE] — connection just ends.
    let pipeline = ResponsePipeline::new(
        Arc::new(ScriptedBackend::new(&["data: {\"delta\":\"tail\"}"])),
        store.clone(),
    );
    let outcome = pipeline
        .send("c1", "x", &plain_directive(), &CancelHandle::new())
        .await
        .expect("turn should complete");
    assert_eq!(outcome.text, "tail");
}

#[tokio::test]
async fn test_midstream_failure_preserves_partial_and_releases_lock() {
    let store = Arc::new(MemoryStore::new());
    let backend = ScriptedBackend {
        chunks: vec![
            Ok("data: {\"delta\":\"Half a tho\"}\n".to_string()),
            Err(BackendError::Transport("connection reset".into())),
        ],
    };
    let pipeline = ResponsePipeline::new(Arc::new(backend), store.clone());
    let outcome = pipeline
        .send("c1", "x", &plain_directive(), &CancelHandle::new())
        .await
        .expect("failure is an outcome, not an Err");

    assert_eq!(outcome.state, StreamState::Error);
    assert!(matches!(outcome.backend_error, Some(BackendError::Transport(_))));
    let history = store.history("c1");
    assert_eq!(history[1].content, "Half a tho", "partial content must survive");
    assert!(history[1].frozen);
    assert!(!pipeline.is_in_flight("c1"), "failed turn must release the slot");
}

#[tokio::test]
async fn test_rate_limit_surfaces_distinctly() {
    let store = Arc::new(MemoryStore::new());
    let backend = FailingBackend {
        error: BackendError::RateLimited {
            message: "429".into(),
            retry_after_secs: Some(7),
        },
    };
    let pipeline = ResponsePipeline::new(Arc::new(backend), store.clone());
    let outcome = pipeline
        .send("c1", "x", &plain_directive(), &CancelHandle::new())
        .await
        .expect("failure is an outcome, not an Err");

    assert_eq!(outcome.state, StreamState::Error);
    let err = outcome.backend_error.expect("error must be surfaced");
    assert!(matches!(err, BackendError::RateLimited { .. }));
    assert_eq!(err.retry_hint(), RetryHint::ShortDelay { secs: 7 });
    // The transcript carries the rate-limit message, not a generic one.
    assert_eq!(store.history("c1")[1].content, err.user_message());
}

#[tokio::test]
async fn test_second_send_rejected_while_streaming() {
    let (backend, tx) = GatedBackend::new();
    let store = Arc::new(MemoryStore::new());
    let pipeline = Arc::new(ResponsePipeline::new(Arc::new(backend), store.clone()));

    let p = pipeline.clone();
    let first = tokio::spawn(async move {
        p.send("c1", "first", &plain_directive(), &CancelHandle::new()).await
    });

    let p = pipeline.clone();
    wait_for("first turn to go in flight", move || p.is_in_flight("c1")).await;

    let rejected = pipeline
        .send("c1", "second", &plain_directive(), &CancelHandle::new())
        .await;
    assert!(
        matches!(rejected, Err(EngineError::StillThinking { .. })),
        "got {rejected:?}"
    );

    // A different conversation is not blocked by c1's turn.
    assert!(!pipeline.is_in_flight("c2"));

    tx.send(Ok("data: {\"delta\":\"done\"}\ndata: [DONE]\n".to_string()))
        .await
        .expect("backend channel open");
    let outcome = first.await.expect("task").expect("first turn completes");
    assert_eq!(outcome.text, "done");

    // Slot released: the conversation accepts turns again.
    assert!(!pipeline.is_in_flight("c1"));
}

#[tokio::test]
async fn test_cancel_keeps_partial_text_as_final() {
    let (backend, tx) = GatedBackend::new();
    let store = Arc::new(MemoryStore::new());
    let pipeline = Arc::new(ResponsePipeline::new(Arc::new(backend), store.clone()));
    let cancel = CancelHandle::new();

    let p = pipeline.clone();
    let c = cancel.clone();
    let turn = tokio::spawn(async move {
        p.send("c1", "tell me a story", &plain_directive(), &c).await
    });

    tx.send(Ok("data: {\"delta\":\"Once upon a time\"}\n".to_string()))
        .await
        .expect("backend channel open");
    let s = store.clone();
    wait_for("the first delta to land", move || {
        s.history("c1").len() == 2 && s.history("c1")[1].content == "Once upon a time"
    })
    .await;

    cancel.cancel();
    let outcome = turn.await.expect("task").expect("cancelled turn still completes");
    assert!(outcome.cancelled);
    assert_eq!(outcome.state, StreamState::Complete);
    assert_eq!(outcome.text, "Once upon a time");
    assert!(store.history("c1")[1].frozen, "partial becomes the final, frozen message");
}

// ── Companion end-to-end ───────────────────────────────────────────────────

#[tokio::test]
async fn test_companion_full_turn_writes_transcript() {
    let backend = ScriptedBackend::new(&["data: {\"delta\":\"Hi! \"}\ndata: {\"delta\":\"How was your day?\"}\ndata: [DONE]\n"]);
    let store = Arc::new(MemoryStore::new());
    let companion = Companion::new(Arc::new(backend), store.clone());

    let outcome = companion
        .take_turn("c1", "good evening", SituationalFacts::default(), &CancelHandle::new())
        .await
        .expect("turn should complete");

    assert_eq!(outcome.text, "Hi! How was your day?");
    let history = store.history("c1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "good evening");
}

#[test]
fn test_companion_stress_accumulation_dampens_directives() {
    let companion = Companion::new(
        Arc::new(ScriptedBackend::new(&[])),
        Arc::new(MemoryStore::new()),
    );
    let t0 = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();

    // Three mildly stressed turns: each alone is below the emotional
    // override bar, but together they activate recovery mode.
    let lines = [
        "another deadline moved up on me",
        "no breaks today, back-to-back meetings",
        "running out of time on everything",
    ];
    let mut last = None;
    for (i, line) in lines.iter().enumerate() {
        let at = t0 + Duration::minutes(i as i64 * 15);
        last = Some(
            companion
                .prepare_turn_at("c1", line, SituationalFacts::default(), at)
                .expect("turn should prepare"),
        );
    }

    let d = last.expect("three turns ran");
    assert_eq!(d.response_length, ResponseLength::Medium, "light recovery row");
    assert_eq!(d.tone, ToneAdaptation::Gentle);
    assert_eq!(d.suggestion_quota, 0, "recovery suppresses suggestions");
    assert_eq!(d.dominant_persona, Persona::Companion);
}
