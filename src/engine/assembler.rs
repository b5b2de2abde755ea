// ── Luma Engine: Context Assembler ─────────────────────────────────────────
//
// Merges all per-turn signals, both state machines, and the situational
// facts into one Directive. Pure function, no I/O — every input is already
// a resolved value.
//
// Priority order, evaluated top-down; the first applicable rule decides
// tone/length/persona/hints and short-circuits the rest:
//   1. confident negative emotion  → emotional safety override, STOP
//   2. recovery mode active        → per-level dampening table
//   3. clear intent                → feature hint + intent→persona mapping
//   4. fallback                    → journey persona + retention-phase defaults
// Situational facts merge last and only enrich; they never override the
// tone/length/priority decisions above.

use crate::atoms::constants::EMOTION_OVERRIDE_CONFIDENCE;
use crate::atoms::types::{
    Directive, FeatureHint, IntentConfidence, IntentKind, Persona, RecoveryLevel, ResponseLength,
    SituationalFacts, ToneAdaptation,
};
use crate::engine::journey::{defaults_for, JourneyState};
use crate::engine::recovery::RecoveryState;
use crate::engine::signals::TurnSignals;
use log::debug;

// ── Mapping tables ─────────────────────────────────────────────────────────

/// Recovery-level → (length, tone, optional wellness hint) dampening table.
/// Productivity hints are always suppressed while recovery is active.
fn recovery_row(level: RecoveryLevel) -> (ResponseLength, ToneAdaptation, Option<FeatureHint>) {
    match level {
        RecoveryLevel::Light => (ResponseLength::Medium, ToneAdaptation::Gentle, None),
        RecoveryLevel::Active => (ResponseLength::Short, ToneAdaptation::Calm, None),
        RecoveryLevel::Deep => (
            ResponseLength::Short,
            ToneAdaptation::Supportive,
            Some(FeatureHint::Breathing),
        ),
        RecoveryLevel::None => (ResponseLength::Medium, ToneAdaptation::Neutral, None),
    }
}

/// Intent → (feature hint, persona, length) for clear classifications.
fn intent_row(kind: IntentKind) -> (Option<FeatureHint>, Persona, ResponseLength) {
    match kind {
        IntentKind::Reminder => (Some(FeatureHint::Reminder), Persona::Companion, ResponseLength::Short),
        IntentKind::Routine => (Some(FeatureHint::Routine), Persona::Founder, ResponseLength::Medium),
        IntentKind::Journal => (Some(FeatureHint::Journal), Persona::Companion, ResponseLength::Medium),
        IntentKind::Recall => (Some(FeatureHint::Memory), Persona::Companion, ResponseLength::Medium),
        IntentKind::Question => (None, Persona::Student, ResponseLength::Medium),
        IntentKind::Chat => (None, Persona::Companion, ResponseLength::Medium),
    }
}

// ── Assembler ──────────────────────────────────────────────────────────────

pub fn assemble(
    signals: &TurnSignals,
    recovery: &RecoveryState,
    journey: &JourneyState,
    facts: SituationalFacts,
) -> Directive {
    let emotion = &signals.emotion;

    // Rule 1: emotional safety always wins. No other component may add
    // feature hints or persona suggestions this turn.
    if emotion.state.is_negative() && emotion.confidence >= EMOTION_OVERRIDE_CONFIDENCE {
        debug!(
            "[engine] Directive: emotional override ({:?}, confidence {:.2})",
            emotion.state, emotion.confidence
        );
        let tone = match emotion.tone {
            t @ (ToneAdaptation::Calm | ToneAdaptation::Supportive) => t,
            _ => ToneAdaptation::Calm,
        };
        return Directive {
            dominant_persona: Persona::Companion,
            response_length: ResponseLength::Short,
            emotional_priority_override: true,
            tone,
            feature_hint: None,
            suggestion_quota: 0,
            situational: facts,
        };
    }

    // Rule 2: active recovery dampens everything productivity-shaped.
    if recovery.is_active() {
        let (response_length, tone, feature_hint) = recovery_row(recovery.level());
        debug!("[engine] Directive: recovery dampening at {:?}", recovery.level());
        return Directive {
            dominant_persona: Persona::Companion,
            response_length,
            emotional_priority_override: false,
            tone,
            feature_hint,
            suggestion_quota: 0,
            situational: facts,
        };
    }

    // Rule 3: a clear intent routes straight to its feature.
    if signals.intent.confidence == IntentConfidence::Clear {
        let (feature_hint, dominant_persona, response_length) = intent_row(signals.intent.kind);
        debug!("[engine] Directive: clear intent {:?}", signals.intent.kind);
        return Directive {
            dominant_persona,
            response_length,
            emotional_priority_override: false,
            tone: emotion.tone,
            feature_hint,
            suggestion_quota: 1,
            situational: facts,
        };
    }

    // Rule 4: fall back to the journey's learned persona and phase defaults.
    let phase = journey.retention_phase();
    let defaults = defaults_for(phase);
    debug!(
        "[engine] Directive: phase fallback ({:?}, persona {:?})",
        phase,
        journey.dominant_persona()
    );
    Directive {
        dominant_persona: journey.dominant_persona(),
        response_length: defaults.response_length,
        emotional_priority_override: false,
        tone: if emotion.tone == ToneAdaptation::Neutral {
            defaults.tone
        } else {
            emotion.tone
        },
        feature_hint: None,
        suggestion_quota: defaults.suggestion_quota,
        situational: facts,
    }
}

// ── Preamble composer ──────────────────────────────────────────────────────

/// Render the Directive into the instruction preamble for the generation
/// request. Sections are all optional and joined with `\n\n---\n\n`.
pub fn render_preamble(directive: &Directive) -> String {
    let mut parts: Vec<String> = Vec::new();

    if directive.emotional_priority_override {
        parts.push(
            "The user is having a hard moment. Respond with warmth and presence. \
            Keep it brief, do not problem-solve unless asked, and do not suggest \
            features, tasks, or productivity of any kind this turn."
                .to_string(),
        );
    } else {
        parts.push(persona_section(directive.dominant_persona).to_string());
        if let Some(hint) = directive.feature_hint {
            parts.push(feature_section(hint).to_string());
        }
        if directive.suggestion_quota > 0 {
            parts.push(format!(
                "You may proactively suggest at most {} thing(s) this turn.",
                directive.suggestion_quota
            ));
        } else {
            parts.push("Make no proactive suggestions this turn.".to_string());
        }
    }

    parts.push(format!(
        "Tone: {}. Length: at most {} sentences.",
        tone_word(directive.tone),
        directive.response_length.sentence_budget()
    ));

    if let Some(section) = facts_section(&directive.situational) {
        parts.push(section);
    }

    parts.join("\n\n---\n\n")
}

fn persona_section(persona: Persona) -> &'static str {
    match persona {
        Persona::Student => {
            "## Companion Mode\nThe user lives a student-shaped life. Frame things \
            around classes, study blocks, and exam cycles when it helps."
        }
        Persona::Founder => {
            "## Companion Mode\nThe user lives a founder-shaped life. Frame things \
            around priorities, momentum, and protecting focus time when it helps."
        }
        Persona::Companion => {
            "## Companion Mode\nBe a warm, attentive companion. No particular \
            life-shape framing."
        }
    }
}

fn feature_section(hint: FeatureHint) -> &'static str {
    match hint {
        FeatureHint::Reminder => "The user wants a reminder set. Confirm what and when, briefly.",
        FeatureHint::Routine => "The user is talking about a routine. Help shape or adjust it.",
        FeatureHint::Journal => "The user wants to journal. Invite them to write, then reflect it back.",
        FeatureHint::Memory => "The user is asking about something from before. Use the memory excerpts below.",
        FeatureHint::Breathing => "Offer one small grounding or breathing exercise, gently.",
    }
}

fn tone_word(tone: ToneAdaptation) -> &'static str {
    match tone {
        ToneAdaptation::Neutral => "natural",
        ToneAdaptation::Calm => "calm and steady",
        ToneAdaptation::Supportive => "warm and supportive",
        ToneAdaptation::Gentle => "gentle and unhurried",
        ToneAdaptation::Upbeat => "bright and encouraging",
    }
}

fn facts_section(facts: &SituationalFacts) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();

    match (&facts.local_time, &facts.weekday) {
        (Some(time), Some(day)) => lines.push(format!("Local time: {day} {time}")),
        (Some(time), None) => lines.push(format!("Local time: {time}")),
        _ => {}
    }
    if let Some(w) = &facts.weather {
        lines.push(format!("Weather: {}, {:.0}°C", w.condition, w.temperature_c));
    }
    if let Some(r) = &facts.routine {
        lines.push(format!("Active routine block: {} at {}", r.name, r.scheduled_at));
    }
    if let Some(p) = &facts.profile {
        if let Some(name) = &p.display_name {
            lines.push(format!("The user goes by {name}."));
        }
    }
    if !facts.memories.is_empty() {
        lines.push("Things the user told you before:".to_string());
        for m in &facts.memories {
            lines.push(format!("- {}", m.text));
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(format!("## Context\n{}", lines.join("\n")))
    }
}
