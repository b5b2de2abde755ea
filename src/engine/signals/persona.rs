// ── Luma Engine: Persona Intent Detector ───────────────────────────────────
//
// Detects which usage persona this turn sounds like (student vs founder)
// from topic keywords. The journey state machine accumulates these into
// slow-moving affinity scores; a single turn never decides the persona.

use crate::atoms::types::{Persona, PersonaSignal};

/// Student-domain topic markers.
const STUDENT_MARKERS: &[&str] = &[
    "exam",
    "midterm",
    "finals",
    "class",
    "lecture",
    "homework",
    "assignment",
    "professor",
    "semester",
    "study",
    "studying",
    "thesis",
    "campus",
    "gpa",
    "revision",
];

/// Founder-domain topic markers.
const FOUNDER_MARKERS: &[&str] = &[
    "startup",
    "investor",
    "pitch",
    "runway",
    "cofounder",
    "co-founder",
    "fundraise",
    "fundraising",
    "revenue",
    "customers",
    "launch",
    "burn rate",
    "demo day",
    "mvp",
    "product-market",
];

fn count_hits(text: &str, markers: &[&str]) -> usize {
    markers.iter().filter(|m| text.contains(*m)).count()
}

/// Detect a persona signal from topic keywords. Returns `None` when the
/// utterance is persona-neutral; equal hit counts lean student (declared
/// first), matching the tie-break convention of the other extractors.
pub fn detect(utterance: &str) -> Option<PersonaSignal> {
    let text = utterance.to_lowercase();

    let student = count_hits(&text, STUDENT_MARKERS);
    let founder = count_hits(&text, FOUNDER_MARKERS);

    let persona = if student == 0 && founder == 0 {
        return None;
    } else if student >= founder {
        Persona::Student
    } else {
        Persona::Founder
    };

    Some(PersonaSignal {
        persona,
        profile: persona.profile(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::Framing;

    #[test]
    fn test_student_topics() {
        let p = detect("I have a midterm and two assignments this week").unwrap();
        assert_eq!(p.persona, Persona::Student);
        assert_eq!(p.profile.framing, Framing::Academic);
    }

    #[test]
    fn test_founder_topics() {
        let p = detect("our investor call about runway went long").unwrap();
        assert_eq!(p.persona, Persona::Founder);
        assert_eq!(p.profile.framing, Framing::Entrepreneurial);
    }

    #[test]
    fn test_neutral_topic_is_none() {
        assert!(detect("want to watch a movie tonight?").is_none());
    }

    #[test]
    fn test_mixed_tie_leans_student() {
        let p = detect("thesis pitch").unwrap();
        assert_eq!(p.persona, Persona::Student);
    }
}
