// ── Luma Engine: Emotion Detector ──────────────────────────────────────────
//
// Per-category emotional scoring over one utterance. Unlike the intent
// classifier, evidence here is ADDITIVE: every matching rule in a category
// contributes its weight, and the category with the highest total wins.
// Ties resolve to the category declared first — negative states are
// declared before positive ones so a mixed utterance errs toward care.
//
// A short-horizon trend (the caller's 30-minute emotion window) adds a
// small persistence boost when the same state keeps showing up.

use super::{compile, CompiledRule};
use crate::atoms::types::{EmotionSignal, EmotionState, EnergyLevel, ToneAdaptation};
use regex::Regex;
use std::sync::LazyLock;

// ── Category rule tables (declaration order = tie-break order) ─────────────

const STRESSED_RULES: &[(&str, f32)] = &[
    (r"(?i)\bstress(?:ed|ful|ing)?\b", 0.5),
    (r"(?i)\bdeadline\b", 0.3),
    (r"(?i)\bunder pressure\b", 0.4),
    (r"(?i)\bso much (?:work|to do)\b", 0.3),
];

const ANXIOUS_RULES: &[(&str, f32)] = &[
    (r"(?i)\b(?:anxious|anxiety)\b", 0.5),
    (r"(?i)\b(?:worried|worrying|nervous)\b", 0.4),
    (r"(?i)\bpanic(?:king|ked)?\b", 0.5),
    (r"(?i)\bwhat if (?:it|i|they|something)\b", 0.2),
];

const OVERWHELMED_RULES: &[(&str, f32)] = &[
    (r"(?i)\boverwhelm(?:ed|ing)?\b", 0.6),
    (r"(?i)\bcan'?t (?:keep up|handle|cope|take)\b", 0.4),
    (r"(?i)\btoo much\b", 0.3),
    (r"(?i)\bburn(?:ed|t)? ?out\b", 0.5),
];

const LOW_RULES: &[(&str, f32)] = &[
    (r"(?i)\b(?:sad|down|blue)\b", 0.4),
    (r"(?i)\b(?:depressed|hopeless|empty|numb)\b", 0.5),
    (r"(?i)\b(?:lonely|alone)\b", 0.4),
    (r"(?i)\b(?:crying|cried|tears)\b", 0.4),
];

const TIRED_RULES: &[(&str, f32)] = &[
    (r"(?i)\b(?:tired|exhausted|sleepy|drained)\b", 0.5),
    (r"(?i)\bno energy\b", 0.4),
    (r"(?i)\b(?:barely slept|up all night|can'?t sleep)\b", 0.4),
];

const HAPPY_RULES: &[(&str, f32)] = &[
    (r"(?i)\b(?:happy|glad|grateful|proud)\b", 0.5),
    (r"(?i)\b(?:great|wonderful|awesome|amazing) (?:day|news|time)\b", 0.4),
    (r"(?i)\bwent (?:really )?well\b", 0.4),
];

const EXCITED_RULES: &[(&str, f32)] = &[
    (r"(?i)\b(?:excited|thrilled|pumped|stoked)\b", 0.5),
    (r"(?i)\bcan'?t wait\b", 0.5),
];

static TABLES: LazyLock<Vec<(EmotionState, Vec<CompiledRule>)>> = LazyLock::new(|| {
    vec![
        (EmotionState::Stressed, compile(STRESSED_RULES)),
        (EmotionState::Anxious, compile(ANXIOUS_RULES)),
        (EmotionState::Overwhelmed, compile(OVERWHELMED_RULES)),
        (EmotionState::Low, compile(LOW_RULES)),
        (EmotionState::Tired, compile(TIRED_RULES)),
        (EmotionState::Happy, compile(HAPPY_RULES)),
        (EmotionState::Excited, compile(EXCITED_RULES)),
    ]
});

static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!{2,}|\b[A-Z]{3,}\b").unwrap());

// ── Detector ───────────────────────────────────────────────────────────────

/// Detect the dominant emotion of one utterance. `recent` is the caller's
/// short-horizon trend (oldest first); two prior sightings of the winning
/// state add a persistence boost. No match → the explicit `Neutral`
/// default, never null.
pub fn detect(utterance: &str, recent: &[EmotionState]) -> EmotionSignal {
    let text = utterance.trim();
    if text.is_empty() {
        return neutral();
    }

    let mut best: Option<(EmotionState, f32)> = None;
    for (state, rules) in TABLES.iter() {
        let total: f32 = rules
            .iter()
            .filter(|r| r.regex.is_match(text))
            .map(|r| r.weight)
            .sum();
        if total > 0.0 && best.map_or(true, |(_, b)| total > b) {
            best = Some((*state, total));
        }
    }

    let Some((state, total)) = best else {
        return neutral();
    };

    let persistence = recent.iter().filter(|s| **s == state).count();
    let boost = if persistence >= 2 { 0.1 } else { 0.0 };
    let confidence = (total + boost).min(1.0);

    EmotionSignal {
        state,
        energy: energy_of(state, text),
        confidence,
        tone: tone_for(state),
    }
}

/// Whether any emotion rule matches at all. Used by the intent classifier
/// to downgrade a vague classification to `Emotional`.
pub(crate) fn has_emotional_marker(text: &str) -> bool {
    TABLES
        .iter()
        .any(|(_, rules)| rules.iter().any(|r| r.regex.is_match(text)))
}

fn neutral() -> EmotionSignal {
    EmotionSignal {
        state: EmotionState::Neutral,
        energy: EnergyLevel::Medium,
        confidence: 0.0,
        tone: ToneAdaptation::Neutral,
    }
}

fn energy_of(state: EmotionState, text: &str) -> EnergyLevel {
    if state == EmotionState::Excited || EMPHASIS.is_match(text) {
        EnergyLevel::High
    } else if matches!(state, EmotionState::Tired | EmotionState::Low) {
        EnergyLevel::Low
    } else {
        EnergyLevel::Medium
    }
}

/// Fixed state → tone adaptation table.
fn tone_for(state: EmotionState) -> ToneAdaptation {
    match state {
        EmotionState::Stressed | EmotionState::Anxious | EmotionState::Overwhelmed => {
            ToneAdaptation::Calm
        }
        EmotionState::Low => ToneAdaptation::Supportive,
        EmotionState::Tired => ToneAdaptation::Gentle,
        EmotionState::Happy | EmotionState::Excited => ToneAdaptation::Upbeat,
        EmotionState::Neutral => ToneAdaptation::Neutral,
    }
}
