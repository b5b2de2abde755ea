// ── Luma Atoms: Pure Data Types ────────────────────────────────────────────
// These are the data structures that flow through the entire engine.
// Signals are immutable values: produced fresh per utterance, never mutated,
// only read and aggregated. Nothing here performs I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Signals ────────────────────────────────────────────────────────────────

/// One classifier's structured output for one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Signal {
    Intent(IntentSignal),
    Emotion(EmotionSignal),
    Stress(StressSignal),
    Persona(PersonaSignal),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSignal {
    pub kind: IntentKind,
    pub confidence: IntentConfidence,
    pub urgency: Urgency,
    /// Extracted payload for action intents ("call mom" in
    /// "remind me to call mom in 10 minutes").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_action: Option<String>,
    /// Raw winning score, kept for diagnostics.
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Reminder,
    Routine,
    Journal,
    Recall,
    Question,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentConfidence {
    Clear,
    Vague,
    Emotional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Now,
    Soon,
    Later,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionSignal {
    pub state: EmotionState,
    pub energy: EnergyLevel,
    /// Accumulated rule evidence, normalized to [0, 1].
    pub confidence: f32,
    pub tone: ToneAdaptation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionState {
    Neutral,
    Happy,
    Excited,
    Tired,
    Stressed,
    Anxious,
    Low,
    Overwhelmed,
}

impl EmotionState {
    /// States that trigger the emotional-priority override when confident.
    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            EmotionState::Stressed
                | EmotionState::Anxious
                | EmotionState::Low
                | EmotionState::Overwhelmed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneAdaptation {
    Neutral,
    Calm,
    Supportive,
    Gentle,
    Upbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressSignal {
    pub kind: StressKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressKind {
    Deadline,
    Overwork,
    Fatigue,
    SelfCriticism,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSignal {
    pub persona: Persona,
    pub profile: BehaviorProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Student,
    Founder,
    /// Neutral default when neither learned persona dominates.
    Companion,
}

impl Persona {
    /// Fixed behavior profile for each persona.
    pub fn profile(&self) -> BehaviorProfile {
        match self {
            Persona::Student => BehaviorProfile {
                pacing: Pacing::Structured,
                framing: Framing::Academic,
            },
            Persona::Founder => BehaviorProfile {
                pacing: Pacing::Flexible,
                framing: Framing::Entrepreneurial,
            },
            Persona::Companion => BehaviorProfile {
                pacing: Pacing::Flexible,
                framing: Framing::Casual,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct BehaviorProfile {
    pub pacing: Pacing,
    pub framing: Framing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    Structured,
    Flexible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    Academic,
    Entrepreneurial,
    Casual,
}

// ── Recovery mode ──────────────────────────────────────────────────────────

/// Escalation levels of the stress-triggered recovery state machine.
/// Ordered so levels can only be compared upward (no flap-down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryLevel {
    None,
    Light,
    Active,
    Deep,
}

// ── Journey / retention ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPhase {
    Safety,
    Value,
    Habit,
    Bond,
    Dependence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressState {
    Calm,
    Busy,
    Stressed,
    Burnout,
    Recovery,
}

/// Exponentially-weighted persona affinity accumulators, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PersonaScores {
    pub student: f32,
    pub founder: f32,
}

// ── Directive ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    Short,
    Medium,
    Long,
}

impl ResponseLength {
    /// Sentence budget rendered into the generation preamble.
    pub fn sentence_budget(&self) -> usize {
        match self {
            ResponseLength::Short => 2,
            ResponseLength::Medium => 5,
            ResponseLength::Long => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureHint {
    Reminder,
    Routine,
    Journal,
    Memory,
    Breathing,
}

impl FeatureHint {
    /// Hints that push the user toward getting things done. Suppressed
    /// while recovery mode is active.
    pub fn is_productivity(&self) -> bool {
        matches!(self, FeatureHint::Reminder | FeatureHint::Routine)
    }
}

/// The merged, prioritized instruction object handed to generation.
/// Never persisted; immutable for the lifetime of one request.
///
/// When `emotional_priority_override` is true, every field except `tone`
/// and `response_length` is advisory and must be ignored by the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub dominant_persona: Persona,
    pub response_length: ResponseLength,
    pub emotional_priority_override: bool,
    pub tone: ToneAdaptation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_hint: Option<FeatureHint>,
    /// Max proactive suggestions generation may make this turn.
    pub suggestion_quota: u8,
    pub situational: SituationalFacts,
}

// ── Situational facts ──────────────────────────────────────────────────────
// Every field is optional; absence never blocks a turn. Facts enrich the
// generation preamble but never override tone/length/priority decisions.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SituationalFacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekday: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine: Option<RoutineBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memories: Vec<MemoryExcerpt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfilePrefs>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub condition: String,
    pub temperature_c: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineBlock {
    pub name: String,
    /// Display form of the scheduled slot, e.g. "07:30".
    pub scheduled_at: String,
    pub kind: RoutineKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineKind {
    Focus,
    Rest,
    Exercise,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryExcerpt {
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePrefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<String>,
}

// ── Conversation records ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One append-only conversation record. The assistant record's content is
/// mutated in place while streaming, then frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Frozen records can no longer be mutated by the stream.
    #[serde(default)]
    pub frozen: bool,
}

impl ChatRecord {
    pub fn new(sender: Sender, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            content: content.into(),
            timestamp,
            frozen: false,
        }
    }
}

// ── Generation request turns ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

/// One role-tagged turn in the generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl From<&ChatRecord> for ChatTurn {
    fn from(r: &ChatRecord) -> Self {
        ChatTurn {
            role: match r.sender {
                Sender::User => TurnRole::User,
                Sender::Assistant => TurnRole::Assistant,
            },
            text: r.content.clone(),
        }
    }
}

// ── Stream session states ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Idle,
    Sending,
    Streaming,
    Complete,
    Error,
}

impl StreamState {
    /// States counted against the at-most-one-in-flight rule.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, StreamState::Sending | StreamState::Streaming)
    }
}
