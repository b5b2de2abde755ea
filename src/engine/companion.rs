// ── Luma Engine: Companion Orchestrator ────────────────────────────────────
//
// Per-turn wiring of the whole engine: extract signals, advance the
// recovery and journey machines, gather facts into the assembler, render
// the Directive, and hand the turn to the streaming pipeline.
//
// State mutation order per turn (the in-flight check comes FIRST, so a
// rejected turn leaves every machine untouched):
//   1. reject if a generation is already in flight for the conversation
//   2. expire stale recovery, then record this turn's stress signal
//   3. journey bookkeeping (streak, persona evidence, timing heuristic)
//   4. assemble the Directive (pure)
//   5. stream the response

use crate::atoms::constants::{EMOTION_TREND_CAP, EMOTION_TREND_MAX_AGE_SECS};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{
    Directive, EmotionState, Persona, RecoveryLevel, RetentionPhase, SituationalFacts, StressState,
};
use crate::engine::assembler::assemble;
use crate::engine::backend::ChatBackend;
use crate::engine::journey::JourneyState;
use crate::engine::recovery::RecoveryState;
use crate::engine::signals::TurnSignals;
use crate::engine::store::ConversationStore;
use crate::engine::stream::{CancelHandle, ResponsePipeline, SendOutcome};
use crate::engine::window::RollingWindow;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

// ── Per-conversation adaptive state ────────────────────────────────────────

struct ConversationState {
    recovery: RecoveryState,
    journey: JourneyState,
    /// 30-minute trend of non-neutral emotion states, for the persistence
    /// boost in the emotion extractor.
    emotion_trend: RollingWindow<EmotionState>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            recovery: RecoveryState::default(),
            journey: JourneyState::default(),
            emotion_trend: RollingWindow::new(
                EMOTION_TREND_CAP,
                Duration::seconds(EMOTION_TREND_MAX_AGE_SECS),
            ),
        }
    }
}

/// Read-only view of a conversation's adaptive state, for hosts that want
/// to surface it (status chips, debug panels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanionSnapshot {
    pub recovery_level: RecoveryLevel,
    pub recovery_active: bool,
    pub retention_phase: RetentionPhase,
    pub dominant_persona: Persona,
    pub stress_state: StressState,
}

// ── Companion ──────────────────────────────────────────────────────────────

pub struct Companion {
    pipeline: ResponsePipeline,
    conversations: Mutex<HashMap<String, ConversationState>>,
}

impl Companion {
    pub fn new(backend: Arc<dyn ChatBackend>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            pipeline: ResponsePipeline::new(backend, store),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    pub fn pipeline(&self) -> &ResponsePipeline {
        &self.pipeline
    }

    /// Run one full turn: signal extraction, state advancement, Directive
    /// assembly, then the streaming pipeline.
    pub async fn take_turn(
        &self,
        conversation: &str,
        utterance: &str,
        facts: SituationalFacts,
        cancel: &CancelHandle,
    ) -> EngineResult<SendOutcome> {
        let directive = self.prepare_turn_at(conversation, utterance, facts, Utc::now())?;
        self.pipeline.send(conversation, utterance, &directive, cancel).await
    }

    /// The synchronous half of a turn, with an injectable clock. Checks the
    /// in-flight rule BEFORE touching any state machine, so a rejected turn
    /// has no side effects.
    pub fn prepare_turn_at(
        &self,
        conversation: &str,
        utterance: &str,
        facts: SituationalFacts,
        now: DateTime<Utc>,
    ) -> EngineResult<Directive> {
        if self.pipeline.is_in_flight(conversation) {
            return Err(EngineError::StillThinking { conversation: conversation.to_string() });
        }

        let mut map = self.conversations.lock();
        let state = map.entry(conversation.to_string()).or_default();

        // Expire before recording, so a 5-hour-stale recovery session does
        // not absorb this turn's signal into an already-dead activation.
        state.recovery.check_expiry(now);

        let trend: Vec<EmotionState> = state.emotion_trend.items(now).copied().collect();
        let signals = TurnSignals::extract(utterance, &trend, now);
        debug!("[engine] Turn signals for {conversation}: {:?}", signals.tagged());

        if let Some(stress) = &signals.stress {
            state.recovery.record(stress.clone(), now);
        }
        if signals.emotion.state != EmotionState::Neutral {
            state.emotion_trend.push(signals.emotion.state, now);
        }

        state.journey.record_activity(now);
        state.journey.observe_persona(signals.persona.as_ref().map(|p| p.persona));
        state.journey.observe_message_timing(utterance.chars().count(), now);

        Ok(assemble(&signals, &state.recovery, &state.journey, facts))
    }

    /// Expire stale recovery sessions across all conversations. Hosts call
    /// this from their own periodic tick; the engine runs no timers.
    pub fn run_periodic_checks(&self, now: DateTime<Utc>) {
        let mut map = self.conversations.lock();
        for state in map.values_mut() {
            state.recovery.check_expiry(now);
        }
    }

    /// User-requested "I'm okay now": unconditional recovery reset.
    pub fn deactivate_recovery(&self, conversation: &str, now: DateTime<Utc>) {
        let mut map = self.conversations.lock();
        if let Some(state) = map.get_mut(conversation) {
            state.recovery.deactivate(now);
        }
    }

    pub fn snapshot(&self, conversation: &str, now: DateTime<Utc>) -> CompanionSnapshot {
        let map = self.conversations.lock();
        match map.get(conversation) {
            Some(state) => CompanionSnapshot {
                recovery_level: state.recovery.level(),
                recovery_active: state.recovery.is_active(),
                retention_phase: state.journey.retention_phase(),
                dominant_persona: state.journey.dominant_persona(),
                stress_state: state.journey.stress_state(&state.recovery, now),
            },
            None => CompanionSnapshot {
                recovery_level: RecoveryLevel::None,
                recovery_active: false,
                retention_phase: RetentionPhase::Safety,
                dominant_persona: Persona::Companion,
                stress_state: StressState::Calm,
            },
        }
    }
}
