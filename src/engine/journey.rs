// ── Luma Engine: Journey State Machine ─────────────────────────────────────
//
// Long-horizon, day-granularity adaptation: onboarding age, activity
// streaks, and slow-moving persona affinity. Unlike recovery mode this
// machine has no stickiness — the retention phase is recomputed from the
// current day count on every read.

use crate::atoms::constants::{
    BOND_MAX_DAY, BUSY_MAX_CHARS, BUSY_MAX_GAP_SECS, HABIT_MAX_DAY, PERSONA_DECAY_PER_IDLE_DAY,
    PERSONA_DOMINANCE_EPSILON, PERSONA_LEARNING_RATE, SAFETY_MAX_DAY, VALUE_MAX_DAY,
};
use crate::atoms::types::{
    Persona, PersonaScores, RecoveryLevel, ResponseLength, RetentionPhase, StressState,
    ToneAdaptation,
};
use crate::engine::recovery::RecoveryState;
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

// ── Retention phase ────────────────────────────────────────────────────────

/// Pure, monotonic step function of days since first use.
pub fn retention_phase(days: u32) -> RetentionPhase {
    if days <= SAFETY_MAX_DAY {
        RetentionPhase::Safety
    } else if days <= VALUE_MAX_DAY {
        RetentionPhase::Value
    } else if days <= HABIT_MAX_DAY {
        RetentionPhase::Habit
    } else if days <= BOND_MAX_DAY {
        RetentionPhase::Bond
    } else {
        RetentionPhase::Dependence
    }
}

/// Fixed per-phase adaptation defaults used when no stronger signal applies.
#[derive(Debug, Clone, Copy)]
pub struct PhaseDefaults {
    pub response_length: ResponseLength,
    pub tone: ToneAdaptation,
    pub suggestion_quota: u8,
}

pub fn defaults_for(phase: RetentionPhase) -> PhaseDefaults {
    match phase {
        // Early days: stay light, earn trust, don't push features.
        RetentionPhase::Safety => PhaseDefaults {
            response_length: ResponseLength::Short,
            tone: ToneAdaptation::Gentle,
            suggestion_quota: 0,
        },
        RetentionPhase::Value => PhaseDefaults {
            response_length: ResponseLength::Medium,
            tone: ToneAdaptation::Neutral,
            suggestion_quota: 1,
        },
        RetentionPhase::Habit => PhaseDefaults {
            response_length: ResponseLength::Medium,
            tone: ToneAdaptation::Neutral,
            suggestion_quota: 2,
        },
        RetentionPhase::Bond => PhaseDefaults {
            response_length: ResponseLength::Long,
            tone: ToneAdaptation::Supportive,
            suggestion_quota: 2,
        },
        RetentionPhase::Dependence => PhaseDefaults {
            response_length: ResponseLength::Long,
            tone: ToneAdaptation::Supportive,
            suggestion_quota: 3,
        },
    }
}

// ── Journey state ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JourneyState {
    pub days_since_first_use: u32,
    pub consecutive_active_days: u32,
    pub persona_scores: PersonaScores,
    first_use_date: Option<NaiveDate>,
    last_active_date: Option<NaiveDate>,
    /// Rolling busy heuristic: length and stamp of the previous message.
    last_message_at: Option<DateTime<Utc>>,
    short_rapid_streak: u8,
}

impl JourneyState {
    pub fn retention_phase(&self) -> RetentionPhase {
        retention_phase(self.days_since_first_use)
    }

    /// Day-streak bookkeeping, called once per turn. A gap of more than one
    /// day resets the streak and applies the idle persona decay per missed
    /// day (the only decay path; there is no timer).
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();

        let first = *self.first_use_date.get_or_insert(today);
        self.days_since_first_use = (today - first).num_days().max(0) as u32;

        match self.last_active_date {
            Some(last) if last == today => {}
            Some(last) => {
                let gap = (today - last).num_days().max(0);
                if gap == 1 {
                    self.consecutive_active_days += 1;
                } else {
                    debug!("[engine] Journey streak reset after {gap}-day gap");
                    self.consecutive_active_days = 1;
                    let idle_days = gap.saturating_sub(1) as f32;
                    self.persona_scores.student =
                        (self.persona_scores.student - PERSONA_DECAY_PER_IDLE_DAY * idle_days).max(0.0);
                    self.persona_scores.founder =
                        (self.persona_scores.founder - PERSONA_DECAY_PER_IDLE_DAY * idle_days).max(0.0);
                }
                self.last_active_date = Some(today);
            }
            None => {
                self.consecutive_active_days = 1;
                self.last_active_date = Some(today);
            }
        }
    }

    /// Accumulate one turn's persona evidence: exponential approach to 1 for
    /// the matched persona, everything untouched otherwise.
    pub fn observe_persona(&mut self, persona: Option<Persona>) {
        match persona {
            Some(Persona::Student) => {
                self.persona_scores.student +=
                    (1.0 - self.persona_scores.student) * PERSONA_LEARNING_RATE;
                self.persona_scores.student = self.persona_scores.student.clamp(0.0, 1.0);
            }
            Some(Persona::Founder) => {
                self.persona_scores.founder +=
                    (1.0 - self.persona_scores.founder) * PERSONA_LEARNING_RATE;
                self.persona_scores.founder = self.persona_scores.founder.clamp(0.0, 1.0);
            }
            Some(Persona::Companion) | None => {}
        }
    }

    /// Dominant persona with a margin: neither score may win by less than
    /// epsilon, otherwise the neutral companion label applies.
    pub fn dominant_persona(&self) -> Persona {
        let PersonaScores { student, founder } = self.persona_scores;
        if student > founder + PERSONA_DOMINANCE_EPSILON {
            Persona::Student
        } else if founder > student + PERSONA_DOMINANCE_EPSILON {
            Persona::Founder
        } else {
            Persona::Companion
        }
    }

    /// Update the short-rapid-message heuristic for busy detection.
    /// Two consecutive short messages inside the gap count as "busy".
    pub fn observe_message_timing(&mut self, message_len: usize, now: DateTime<Utc>) {
        let rapid = self
            .last_message_at
            .map_or(false, |prev| {
                now.signed_duration_since(prev).num_seconds() <= BUSY_MAX_GAP_SECS
            });
        if rapid && message_len <= BUSY_MAX_CHARS {
            self.short_rapid_streak = self.short_rapid_streak.saturating_add(1);
        } else {
            self.short_rapid_streak = 0;
        }
        self.last_message_at = Some(now);
    }

    fn looks_busy(&self) -> bool {
        self.short_rapid_streak >= 2
    }

    /// Coarse stress status, an explicit mapping over the recovery machine
    /// plus message-timing heuristics.
    pub fn stress_state(&self, recovery: &RecoveryState, now: DateTime<Utc>) -> StressState {
        if recovery.is_active() {
            return match recovery.level() {
                RecoveryLevel::Deep => StressState::Burnout,
                RecoveryLevel::Active | RecoveryLevel::Light => StressState::Stressed,
                RecoveryLevel::None => StressState::Calm, // unreachable while active
            };
        }
        if recovery.was_recently_active(now) {
            StressState::Recovery
        } else if self.looks_busy() && !recovery.has_recent_signal(now) {
            // Busy means short rapid messages WITHOUT stress evidence;
            // fresh signals below the activation threshold stay `calm`.
            StressState::Busy
        } else {
            StressState::Calm
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{StressKind, StressSignal};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_retention_phase_breakpoints() {
        assert_eq!(retention_phase(0), RetentionPhase::Safety);
        assert_eq!(retention_phase(3), RetentionPhase::Safety);
        assert_eq!(retention_phase(4), RetentionPhase::Value);
        assert_eq!(retention_phase(7), RetentionPhase::Value);
        assert_eq!(retention_phase(8), RetentionPhase::Habit);
        assert_eq!(retention_phase(14), RetentionPhase::Habit);
        assert_eq!(retention_phase(15), RetentionPhase::Bond);
        assert_eq!(retention_phase(21), RetentionPhase::Bond);
        assert_eq!(retention_phase(22), RetentionPhase::Dependence);
        assert_eq!(retention_phase(100), RetentionPhase::Dependence);
    }

    #[test]
    fn test_persona_exponential_approach() {
        let mut j = JourneyState::default();
        j.observe_persona(Some(Persona::Student));
        assert!((j.persona_scores.student - 0.1).abs() < 1e-6);
        j.observe_persona(Some(Persona::Student));
        assert!((j.persona_scores.student - 0.19).abs() < 1e-6);
        // Never exceeds 1 however many turns.
        for _ in 0..200 {
            j.observe_persona(Some(Persona::Student));
        }
        assert!(j.persona_scores.student <= 1.0);
    }

    #[test]
    fn test_dominance_needs_margin() {
        let mut j = JourneyState::default();
        j.observe_persona(Some(Persona::Student));
        // One step (0.1) is not strictly above the epsilon margin.
        assert_eq!(j.dominant_persona(), Persona::Companion);
        j.observe_persona(Some(Persona::Student));
        assert_eq!(j.dominant_persona(), Persona::Student);
    }

    #[test]
    fn test_neutral_turn_leaves_scores_unchanged() {
        let mut j = JourneyState::default();
        j.observe_persona(Some(Persona::Founder));
        let before = j.persona_scores;
        j.observe_persona(None);
        assert!((j.persona_scores.founder - before.founder).abs() < f32::EPSILON);
        assert!((j.persona_scores.student - before.student).abs() < f32::EPSILON);
    }

    #[test]
    fn test_streak_and_day_count() {
        let mut j = JourneyState::default();
        j.record_activity(t0());
        assert_eq!(j.days_since_first_use, 0);
        assert_eq!(j.consecutive_active_days, 1);

        j.record_activity(t0() + Duration::days(1));
        assert_eq!(j.days_since_first_use, 1);
        assert_eq!(j.consecutive_active_days, 2);

        // Same-day turns don't double count.
        j.record_activity(t0() + Duration::days(1) + Duration::hours(2));
        assert_eq!(j.consecutive_active_days, 2);

        // A 3-day gap resets the streak.
        j.record_activity(t0() + Duration::days(4));
        assert_eq!(j.consecutive_active_days, 1);
        assert_eq!(j.days_since_first_use, 4);
    }

    #[test]
    fn test_idle_gap_decays_persona_scores() {
        let mut j = JourneyState::default();
        j.record_activity(t0());
        for _ in 0..5 {
            j.observe_persona(Some(Persona::Founder));
        }
        let before = j.persona_scores.founder;
        j.record_activity(t0() + Duration::days(6)); // 5 idle days
        assert!(j.persona_scores.founder < before);
        assert!(j.persona_scores.founder >= 0.0);
    }

    #[test]
    fn test_stress_state_mapping() {
        let now = t0();
        let mut recovery = RecoveryState::default();
        let mut j = JourneyState::default();

        assert_eq!(j.stress_state(&recovery, now), StressState::Calm);

        // Deep recovery → burnout.
        for _ in 0..5 {
            recovery.record(
                StressSignal { kind: StressKind::Overwork, timestamp: now },
                now,
            );
        }
        assert_eq!(j.stress_state(&recovery, now), StressState::Burnout);

        // Deactivated within 24h → recovery.
        recovery.deactivate(now);
        assert_eq!(
            j.stress_state(&recovery, now + Duration::hours(2)),
            StressState::Recovery
        );

        // Short rapid messages with no stress → busy (once recovery fades).
        let later = now + Duration::days(2);
        j.observe_message_timing(10, later);
        j.observe_message_timing(8, later + Duration::seconds(5));
        j.observe_message_timing(12, later + Duration::seconds(10));
        assert_eq!(j.stress_state(&recovery, later), StressState::Busy);
    }

    #[test]
    fn test_rapid_short_messages_with_fresh_stress_are_not_busy() {
        let now = t0();
        let mut recovery = RecoveryState::default();
        let mut j = JourneyState::default();

        // Two signals: stress evidence exists but recovery has not tripped.
        for _ in 0..2 {
            recovery.record(
                StressSignal { kind: StressKind::Deadline, timestamp: now },
                now,
            );
        }
        assert!(!recovery.is_active());

        j.observe_message_timing(10, now);
        j.observe_message_timing(8, now + Duration::seconds(5));
        j.observe_message_timing(12, now + Duration::seconds(10));
        let at = now + Duration::seconds(10);
        assert_eq!(j.stress_state(&recovery, at), StressState::Calm, "stress evidence suppresses busy");

        // Once the signals age past the window horizon, busy applies again.
        let later = now + Duration::hours(3);
        j.observe_message_timing(9, later);
        j.observe_message_timing(7, later + Duration::seconds(5));
        j.observe_message_timing(11, later + Duration::seconds(10));
        assert_eq!(
            j.stress_state(&recovery, later + Duration::seconds(10)),
            StressState::Busy
        );
    }

    #[test]
    fn test_active_light_maps_to_stressed() {
        let now = t0();
        let mut recovery = RecoveryState::default();
        let j = JourneyState::default();
        for _ in 0..3 {
            recovery.record(
                StressSignal { kind: StressKind::Deadline, timestamp: now },
                now,
            );
        }
        assert_eq!(j.stress_state(&recovery, now), StressState::Stressed);
    }
}
