// ── Luma Engine: Situational Facts ─────────────────────────────────────────
//
// Boundary layer for externally supplied facts (time, weather, routine,
// stored memories, profile preferences). Every category is optional and
// validated here BEFORE it reaches the assembler, so the merge step can
// assume resolved, bounded values. A missing provider simply leaves its
// field absent; it never blocks the turn.

use crate::atoms::constants::{MAX_EXCERPT_CHARS, MAX_MEMORY_EXCERPTS};
use crate::atoms::types::{
    MemoryExcerpt, ProfilePrefs, RoutineBlock, SituationalFacts, WeatherSnapshot,
};
use chrono::{DateTime, Utc};
use log::warn;

/// Render the user-local time and weekday. Falls back to UTC when the
/// timezone string does not parse, rather than dropping the fact.
pub fn local_context(timezone: Option<&str>, now: DateTime<Utc>) -> (String, String) {
    if let Some(tz) = timezone.and_then(|t| t.parse::<chrono_tz::Tz>().ok()) {
        let local = now.with_timezone(&tz);
        (
            local.format("%H:%M").to_string(),
            local.format("%A").to_string(),
        )
    } else {
        if timezone.is_some() {
            warn!("[engine] Unparseable timezone {timezone:?}, using UTC");
        }
        (now.format("%H:%M").to_string(), now.format("%A").to_string())
    }
}

/// Assemble and sanitize the per-turn fact bundle.
///
/// Bounds applied at this boundary:
///   - at most `MAX_MEMORY_EXCERPTS` memory excerpts, most recent first
///   - each excerpt clamped to `MAX_EXCERPT_CHARS` characters
///   - empty excerpts and blank routine names dropped
pub fn gather(
    now: DateTime<Utc>,
    profile: Option<ProfilePrefs>,
    weather: Option<WeatherSnapshot>,
    routine: Option<RoutineBlock>,
    mut memories: Vec<MemoryExcerpt>,
) -> SituationalFacts {
    let tz = profile.as_ref().and_then(|p| p.timezone.as_deref());
    let (local_time, weekday) = local_context(tz, now);

    memories.retain(|m| !m.text.trim().is_empty());
    memories.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
    memories.truncate(MAX_MEMORY_EXCERPTS);
    for m in &mut memories {
        if m.text.chars().count() > MAX_EXCERPT_CHARS {
            m.text = m.text.chars().take(MAX_EXCERPT_CHARS).collect();
        }
    }

    let routine = routine.filter(|r| !r.name.trim().is_empty());

    SituationalFacts {
        local_time: Some(local_time),
        weekday: Some(weekday),
        weather,
        routine,
        memories,
        profile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_local_context_with_timezone() {
        let (time, weekday) = local_context(Some("Asia/Seoul"), now());
        assert_eq!(time, "23:30"); // UTC+9
        assert_eq!(weekday, "Monday");
    }

    #[test]
    fn test_bad_timezone_falls_back_to_utc() {
        let (time, _) = local_context(Some("Mars/Olympus"), now());
        assert_eq!(time, "14:30");
    }

    #[test]
    fn test_memory_bounds() {
        let memories: Vec<MemoryExcerpt> = (0..10)
            .map(|i| MemoryExcerpt {
                text: "x".repeat(500),
                recorded_at: now() - chrono::Duration::days(i),
            })
            .collect();
        let facts = gather(now(), None, None, None, memories);
        assert_eq!(facts.memories.len(), MAX_MEMORY_EXCERPTS);
        assert!(facts.memories.iter().all(|m| m.text.chars().count() <= MAX_EXCERPT_CHARS));
        // Most recent kept first.
        assert_eq!(facts.memories[0].recorded_at, now());
    }

    #[test]
    fn test_absent_providers_degrade_gracefully() {
        let facts = gather(now(), None, None, None, vec![]);
        assert!(facts.weather.is_none());
        assert!(facts.routine.is_none());
        assert!(facts.memories.is_empty());
        assert!(facts.local_time.is_some(), "time is always available");
    }

    #[test]
    fn test_blank_routine_dropped() {
        let routine = RoutineBlock {
            name: "  ".into(),
            scheduled_at: "07:00".into(),
            kind: crate::atoms::types::RoutineKind::Focus,
        };
        let facts = gather(now(), None, None, Some(routine), vec![]);
        assert!(facts.routine.is_none());
    }
}
