// ═══════════════════════════════════════════════════════════════════════════
// Luma Engine — adaptive conversational context for a companion app
// ═══════════════════════════════════════════════════════════════════════════
//
// The engine sits between a chat surface and a text-generation backend and
// decides, per turn, HOW the companion should respond: which persona frame,
// what tone and length, which feature to surface, and what situational
// context rides along. It does this with deterministic signal extractors,
// two small state machines (short-horizon recovery, long-horizon journey),
// a priority-merge assembler, and a streaming response pipeline.
//
// Layering:
//   atoms/   pure types, constants, errors — no engine imports
//   engine/  extractors, state machines, assembler, store, pipeline
//
// Typical host wiring:
//   let backend = Arc::new(HttpBackend::new(config));
//   let store = Arc::new(MemoryStore::new());
//   let companion = Companion::new(backend, store);
//   let outcome = companion.take_turn(conv, text, facts, &cancel).await?;

pub mod atoms;
pub mod engine;

pub use atoms::constants;
pub use atoms::error::{BackendError, EngineError, EngineResult, RetryHint};
pub use atoms::types::{
    ChatRecord, ChatTurn, Directive, EmotionSignal, EmotionState, FeatureHint, IntentConfidence,
    IntentKind, IntentSignal, Persona, PersonaSignal, RecoveryLevel, ResponseLength,
    RetentionPhase, Sender, Signal, SituationalFacts, StreamState, StressKind, StressSignal,
    StressState, ToneAdaptation, TurnRole, Urgency,
};
pub use engine::assembler::{assemble, render_preamble};
pub use engine::backend::{BackendConfig, ChatBackend, ChunkStream, HttpBackend};
pub use engine::companion::{Companion, CompanionSnapshot};
pub use engine::facts::gather;
pub use engine::journey::JourneyState;
pub use engine::recovery::RecoveryState;
pub use engine::signals::TurnSignals;
pub use engine::store::{ConversationStore, MemoryStore};
pub use engine::stream::{CancelHandle, DeltaParser, ResponsePipeline, SendOutcome, StreamSession};
pub use engine::window::RollingWindow;
