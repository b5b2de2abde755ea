// ── Luma Engine: Signal Extractors ─────────────────────────────────────────
//
// Pure, deterministic classifiers over a single utterance (+ minimal rolling
// history). No side effects, no I/O. Each extractor runs a fixed ordered
// rule table; malformed or empty input degrades to the neutral default —
// a classification failure must never escape past the extractor boundary.
//
// Rule tables are declared as `(pattern, weight)` pairs and compiled once
// via `LazyLock`, so individual rules stay independently testable.

pub mod emotion;
pub mod intent;
pub mod persona;
pub mod stress;

use crate::atoms::types::{
    EmotionSignal, EmotionState, IntentSignal, PersonaSignal, Signal, StressSignal,
};
use chrono::{DateTime, Utc};
use regex::Regex;

// ── Rule machinery ─────────────────────────────────────────────────────────

pub(crate) struct CompiledRule {
    pub regex: Regex,
    pub weight: f32,
}

/// Compile an ordered `(pattern, weight)` table. Invalid patterns are a
/// programming error in a static table, so compilation panics at first use.
pub(crate) fn compile(rules: &[(&str, f32)]) -> Vec<CompiledRule> {
    rules
        .iter()
        .map(|(pattern, weight)| CompiledRule {
            regex: Regex::new(pattern).unwrap_or_else(|e| panic!("bad rule {pattern:?}: {e}")),
            weight: *weight,
        })
        .collect()
}

/// Highest-weight matching rule wins; ties break by declaration order.
/// Returns the winning rule and its matched-substring length in chars.
pub(crate) fn strongest_match<'a>(
    rules: &'a [CompiledRule],
    text: &str,
) -> Option<(&'a CompiledRule, usize)> {
    let mut best: Option<(&CompiledRule, usize)> = None;
    for rule in rules {
        if let Some(m) = rule.regex.find(text) {
            let len = m.as_str().chars().count();
            match best {
                Some((b, _)) if rule.weight <= b.weight => {}
                _ => best = Some((rule, len)),
            }
        }
    }
    best
}

// ── Per-turn signal bundle ─────────────────────────────────────────────────

/// All leaf classifications for one utterance, computed together at the
/// start of a turn and then treated as immutable input to the state
/// machines and the assembler.
#[derive(Debug, Clone)]
pub struct TurnSignals {
    pub intent: IntentSignal,
    pub emotion: EmotionSignal,
    pub stress: Option<StressSignal>,
    pub persona: Option<PersonaSignal>,
}

impl TurnSignals {
    /// Run every extractor over the utterance. `recent_emotions` is the
    /// 30-minute emotion trend (oldest first); `now` stamps stress signals.
    pub fn extract(
        utterance: &str,
        recent_emotions: &[EmotionState],
        now: DateTime<Utc>,
    ) -> TurnSignals {
        TurnSignals {
            intent: intent::classify(utterance),
            emotion: emotion::detect(utterance, recent_emotions),
            stress: stress::detect(utterance, now),
            persona: persona::detect(utterance),
        }
    }

    /// Tagged view of the bundle, mainly for diagnostics and serialization.
    pub fn tagged(&self) -> Vec<Signal> {
        let mut out = vec![
            Signal::Intent(self.intent.clone()),
            Signal::Emotion(self.emotion.clone()),
        ];
        if let Some(s) = &self.stress {
            out.push(Signal::Stress(s.clone()));
        }
        if let Some(p) = &self.persona {
            out.push(Signal::Persona(p.clone()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::IntentKind;

    #[test]
    fn test_strongest_match_prefers_weight_over_order() {
        let rules = compile(&[(r"cat", 1.0), (r"dog", 5.0)]);
        let (winner, _) = strongest_match(&rules, "cat and dog").unwrap();
        assert!((winner.weight - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_strongest_match_tie_breaks_by_declaration_order() {
        let rules = compile(&[(r"alpha", 3.0), (r"beta", 3.0)]);
        let (winner, _) = strongest_match(&rules, "beta alpha").unwrap();
        assert_eq!(winner.regex.as_str(), "alpha");
    }

    #[test]
    fn test_extract_never_panics_on_garbage() {
        for input in ["", "   ", "\u{0}\u{0}", "🦀🦀🦀"] {
            let s = TurnSignals::extract(input, &[], Utc::now());
            assert_eq!(s.intent.kind, IntentKind::Chat, "got {:?}", s.intent);
            assert_eq!(s.emotion.state, EmotionState::Neutral);
            assert!(s.stress.is_none());
            assert!(s.persona.is_none());
        }
    }
}
