// ── Luma Engine: Stress Signal Detector ────────────────────────────────────
//
// Emits at most one `StressSignal` per utterance for the recovery state
// machine to accumulate. Absence of a match is `None` — "no signal", not an
// error — and the state machine treats anything malformed the same way, so
// a bad classification degrades to inaction rather than breaking the turn.

use super::{compile, strongest_match, CompiledRule};
use crate::atoms::types::{StressKind, StressSignal};
use chrono::{DateTime, Utc};
use std::sync::LazyLock;

// ── Rule tables ────────────────────────────────────────────────────────────

const DEADLINE_RULES: &[(&str, f32)] = &[
    (r"(?i)\bdeadline\b", 0.8),
    (r"(?i)\bdue (?:today|tonight|tomorrow|in \d+ (?:hours?|days?))\b", 0.8),
    (r"(?i)\brunning out of time\b", 0.7),
    (r"(?i)\b(?:exam|test|presentation) (?:today|tomorrow)\b", 0.7),
];

const OVERWORK_RULES: &[(&str, f32)] = &[
    (r"(?i)\b(?:so|too) much (?:work|to do)\b", 0.7),
    (r"(?i)\bworking all (?:day|night|weekend)\b", 0.7),
    (r"(?i)\bback.to.back\b", 0.6),
    (r"(?i)\bno break(?:s)?\b", 0.6),
    (r"(?i)\bstress(?:ed|ful)?\b", 0.5),
];

const FATIGUE_RULES: &[(&str, f32)] = &[
    (r"(?i)\bexhausted\b", 0.7),
    (r"(?i)\b(?:can'?t sleep|barely slept|up all night)\b", 0.7),
    (r"(?i)\b(?:so tired|drained|running on empty)\b", 0.6),
];

const SELF_CRITICISM_RULES: &[(&str, f32)] = &[
    (r"(?i)\bi'?m (?:such )?a failure\b", 0.8),
    (r"(?i)\bi can'?t do (?:this|anything)\b", 0.7),
    (r"(?i)\bnot good enough\b", 0.7),
    (r"(?i)\b(?:hate myself|i'?m useless)\b", 0.8),
];

static TABLES: LazyLock<Vec<(StressKind, Vec<CompiledRule>)>> = LazyLock::new(|| {
    vec![
        (StressKind::Deadline, compile(DEADLINE_RULES)),
        (StressKind::Overwork, compile(OVERWORK_RULES)),
        (StressKind::Fatigue, compile(FATIGUE_RULES)),
        (StressKind::SelfCriticism, compile(SELF_CRITICISM_RULES)),
    ]
});

// ── Detector ───────────────────────────────────────────────────────────────

/// Detect a stress signal in one utterance, stamped with `now`.
/// The strongest matching kind wins; declaration order breaks ties.
pub fn detect(utterance: &str, now: DateTime<Utc>) -> Option<StressSignal> {
    let text = utterance.trim();
    if text.is_empty() {
        return None;
    }

    let mut best: Option<(StressKind, f32)> = None;
    for (kind, rules) in TABLES.iter() {
        if let Some((rule, _)) = strongest_match(rules, text) {
            if best.map_or(true, |(_, w)| rule.weight > w) {
                best = Some((*kind, rule.weight));
            }
        }
    }

    best.map(|(kind, _)| StressSignal { kind, timestamp: now })
}
