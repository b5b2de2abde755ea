// ── Luma Atoms: Constants ──────────────────────────────────────────────────
// All named constants for the crate live here.
// Rationale: collecting constants in one place eliminates magic numbers,
// makes tuning auditable, and keeps every layer's code self-documenting.

// ── Rolling windows ────────────────────────────────────────────────────────
// Eviction is lazy (on read) and the age boundary is exclusive: an entry
// aged exactly `max_age` is still inside the window.
pub const STRESS_WINDOW_MAX_AGE_SECS: i64 = 2 * 3600; // 2 hours
pub const STRESS_WINDOW_CAP: usize = 50;
pub const EMOTION_TREND_MAX_AGE_SECS: i64 = 30 * 60; // 30 minutes
pub const EMOTION_TREND_CAP: usize = 20;

// ── Recovery mode ──────────────────────────────────────────────────────────
// Level thresholds are counts of stress signals inside the 2-hour window at
// the moment of the most recent transition. Levels never auto-decrease;
// only expiry or an explicit deactivation resets them.
pub const RECOVERY_LIGHT_AT: usize = 3;
pub const RECOVERY_ACTIVE_AT: usize = 4;
pub const RECOVERY_DEEP_AT: usize = 5;
/// A recovery activation expires once the newest stress signal is older
/// than this (checked by the caller's periodic tick, not a timer here).
pub const RECOVERY_EXPIRY_SECS: i64 = 4 * 3600; // 4 hours
/// How long after deactivation the journey layer still reports `recovery`.
pub const RECOVERY_RECENT_SECS: i64 = 24 * 3600;

// ── Retention phases (inclusive upper day bounds) ──────────────────────────
pub const SAFETY_MAX_DAY: u32 = 3;
pub const VALUE_MAX_DAY: u32 = 7;
pub const HABIT_MAX_DAY: u32 = 14;
pub const BOND_MAX_DAY: u32 = 21;

// ── Persona scoring ────────────────────────────────────────────────────────
/// Exponential approach rate: `score += (1 - score) * RATE` per matching turn.
pub const PERSONA_LEARNING_RATE: f32 = 0.1;
/// Dominance margin. One matching turn (score 0.1) must not flip dominance
/// on its own, hence epsilon equals a single learning step.
pub const PERSONA_DOMINANCE_EPSILON: f32 = 0.1;
/// Linear decay applied per full idle day when a streak gap is observed.
pub const PERSONA_DECAY_PER_IDLE_DAY: f32 = 0.02;

// ── Intent scoring ─────────────────────────────────────────────────────────
/// `score = rule weight + match_length_ratio * INTENT_LENGTH_BONUS`.
pub const INTENT_LENGTH_BONUS: f32 = 10.0;
/// Scores at or above this are reported with `Clear` confidence.
pub const CLEAR_INTENT_SCORE: f32 = 85.0;

// ── Emotional priority override ────────────────────────────────────────────
/// Minimum emotion confidence for the assembler's rule-1 short-circuit.
pub const EMOTION_OVERRIDE_CONFIDENCE: f32 = 0.7;

// ── Busy detection ─────────────────────────────────────────────────────────
// "Short rapid messages with no stress signal": two consecutive messages
// under the length cap arriving within the gap.
pub const BUSY_MAX_CHARS: usize = 40;
pub const BUSY_MAX_GAP_SECS: i64 = 30;

// ── Situational fact bounds ────────────────────────────────────────────────
pub const MAX_MEMORY_EXCERPTS: usize = 5;
pub const MAX_EXCERPT_CHARS: usize = 280;

// ── Streaming pipeline ─────────────────────────────────────────────────────
/// Shown when a stream ends without producing a single text delta.
/// The user is never left with silence.
pub const FALLBACK_ASSISTANT_MESSAGE: &str =
    "I'm here — I didn't quite catch that. Could you say it again?";
