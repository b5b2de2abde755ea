// ── Luma Engine: Intent Classifier ─────────────────────────────────────────
//
// Classify what the user wants this turn and how urgently. Example:
//   "remind me to call mom in 10 minutes"   → Reminder, clear, soon
//   "do you remember what I said about it?" → Recall
//   "ugh everything is too much"            → Chat, emotional
//
// Scoring: per candidate kind, the strongest matching rule contributes
//   score = weight + (matched_len / utterance_len) * INTENT_LENGTH_BONUS
// so a pattern that covers the whole utterance beats a stray keyword hit.
// The highest-scoring kind wins; `Clear` confidence needs score ≥ 85.

use super::{compile, emotion, strongest_match, CompiledRule};
use crate::atoms::constants::{CLEAR_INTENT_SCORE, INTENT_LENGTH_BONUS};
use crate::atoms::types::{IntentConfidence, IntentKind, IntentSignal, Urgency};
use regex::Regex;
use std::sync::LazyLock;

// ── Rule tables ────────────────────────────────────────────────────────────
// Order inside a table only matters for equal weights (first declared wins).
// Patterns deliberately swallow the rest of the clause (`.*`) so the match
// length ratio rewards utterances that are entirely about the intent.

const REMINDER_RULES: &[(&str, f32)] = &[
    (r"(?i)\bremind me (?:to|about|that)\b.*", 80.0),
    (r"(?i)\bset (?:a |an )?(?:reminder|alarm|timer)\b.*", 78.0),
    (r"(?i)\bdon'?t let me forget\b.*", 76.0),
];

const ROUTINE_RULES: &[(&str, f32)] = &[
    (
        r"(?i)\b(?:start|begin|plan|build|change) my (?:morning|evening|daily|study|work|bedtime) routine\b.*",
        78.0,
    ),
    (r"(?i)\bmy (?:morning|evening|daily|bedtime) routine\b.*", 72.0),
    (r"(?i)\bschedule (?:a |my )?\b.*", 68.0),
];

const JOURNAL_RULES: &[(&str, f32)] = &[
    (r"(?i)\b(?:journal|diary) (?:entry|about)?\b.*", 76.0),
    (r"(?i)\bwrite (?:this|it|that) down\b.*", 74.0),
    (r"(?i)\blog my day\b.*", 74.0),
];

const RECALL_RULES: &[(&str, f32)] = &[
    (r"(?i)\bdo you remember\b.*", 78.0),
    (r"(?i)\bwhat did i (?:say|tell you|mention)\b.*", 78.0),
    (r"(?i)\bremember when\b.*", 74.0),
];

const QUESTION_RULES: &[(&str, f32)] = &[
    (
        r"(?i)^(?:what|how|why|when|where|who|which|can you|could you|do you|is it|are you)\b.*",
        60.0,
    ),
    (r"\?\s*$", 55.0),
];

static TABLES: LazyLock<Vec<(IntentKind, Vec<CompiledRule>)>> = LazyLock::new(|| {
    vec![
        (IntentKind::Reminder, compile(REMINDER_RULES)),
        (IntentKind::Routine, compile(ROUTINE_RULES)),
        (IntentKind::Journal, compile(JOURNAL_RULES)),
        (IntentKind::Recall, compile(RECALL_RULES)),
        (IntentKind::Question, compile(QUESTION_RULES)),
    ]
});

// ── Urgency & sub-action extraction ────────────────────────────────────────

static URGENCY_NOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:right now|now|asap|immediately|right away|this second)\b").unwrap()
});

static URGENCY_SOON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:in \d+ ?(?:minutes?|mins?|hours?|hrs?)|today|tonight|this (?:morning|afternoon|evening)|within the hour)\b",
    )
    .unwrap()
});

static SUB_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bremind me (?:to|about|that)\s+(.+?)(?:\s+(?:in|at|on|by|before|after)\s.+|\s+(?:tomorrow|tonight|today)\b.*)?$",
    )
    .unwrap()
});

fn urgency_of(text: &str) -> Urgency {
    if URGENCY_NOW.is_match(text) {
        Urgency::Now
    } else if URGENCY_SOON.is_match(text) {
        Urgency::Soon
    } else {
        Urgency::Later
    }
}

fn sub_action_of(kind: IntentKind, text: &str) -> Option<String> {
    if kind != IntentKind::Reminder {
        return None;
    }
    SUB_ACTION
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

// ── Classifier ─────────────────────────────────────────────────────────────

/// Classify one utterance. Pure and total: empty or unmatched input falls
/// back to the `Chat` default — never an error, never a null.
pub fn classify(utterance: &str) -> IntentSignal {
    let text = utterance.trim();
    if text.is_empty() {
        return default_signal();
    }
    let total_chars = text.chars().count() as f32;

    let mut best: Option<(IntentKind, f32)> = None;
    for (kind, rules) in TABLES.iter() {
        if let Some((rule, match_len)) = strongest_match(rules, text) {
            let ratio = match_len as f32 / total_chars;
            let score = rule.weight + ratio * INTENT_LENGTH_BONUS;
            // Strict greater-than keeps declaration order as the tie-break.
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((*kind, score));
            }
        }
    }

    let (kind, score) = best.unwrap_or((IntentKind::Chat, 0.0));
    let confidence = if score >= CLEAR_INTENT_SCORE {
        IntentConfidence::Clear
    } else if emotion::has_emotional_marker(text) {
        IntentConfidence::Emotional
    } else {
        IntentConfidence::Vague
    };

    IntentSignal {
        kind,
        confidence,
        urgency: urgency_of(text),
        sub_action: sub_action_of(kind, text),
        score,
    }
}

fn default_signal() -> IntentSignal {
    IntentSignal {
        kind: IntentKind::Chat,
        confidence: IntentConfidence::Vague,
        urgency: Urgency::Later,
        sub_action: None,
        score: 0.0,
    }
}
