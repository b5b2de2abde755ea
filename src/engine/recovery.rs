// ── Luma Engine: Recovery State Machine ────────────────────────────────────
//
// Short-horizon stress-triggered behavioral dampening.
//
// Transitions:
//   none → light/active/deep   when ≥3 stress signals land inside the
//                              2-hour window (3→light, 4→active, ≥5→deep)
//   level escalation only      while active, the level can rise with new
//                              signals but never falls; de-escalation goes
//                              through deactivation to avoid flapping
//   → none                     expiry (newest signal older than 4h, checked
//                              by the caller's periodic tick) or an explicit
//                              manual deactivation
//
// Only these transition functions mutate the state; each mutation is atomic
// from the caller's point of view because the pipeline's in-flight rule
// keeps turns strictly sequential.

use crate::atoms::constants::{
    RECOVERY_ACTIVE_AT, RECOVERY_DEEP_AT, RECOVERY_EXPIRY_SECS, RECOVERY_LIGHT_AT,
    RECOVERY_RECENT_SECS, STRESS_WINDOW_CAP, STRESS_WINDOW_MAX_AGE_SECS,
};
use crate::atoms::types::{RecoveryLevel, StressSignal};
use crate::engine::window::RollingWindow;
use chrono::{DateTime, Duration, Utc};
use log::info;

pub struct RecoveryState {
    level: RecoveryLevel,
    is_active: bool,
    activated_at: Option<DateTime<Utc>>,
    /// Stamp of the most recent accepted signal. Kept outside the window so
    /// the 4-hour expiry check survives the window's own 2-hour eviction.
    last_signal_at: Option<DateTime<Utc>>,
    /// Stamp of the most recent reset from an active state, for the journey
    /// layer's 24-hour "recovery" status.
    deactivated_at: Option<DateTime<Utc>>,
    window: RollingWindow<StressSignal>,
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self {
            level: RecoveryLevel::None,
            is_active: false,
            activated_at: None,
            last_signal_at: None,
            deactivated_at: None,
            window: RollingWindow::new(
                STRESS_WINDOW_CAP,
                Duration::seconds(STRESS_WINDOW_MAX_AGE_SECS),
            ),
        }
    }
}

/// Level as a function of the window count at transition time.
fn level_for(count: usize) -> RecoveryLevel {
    if count >= RECOVERY_DEEP_AT {
        RecoveryLevel::Deep
    } else if count >= RECOVERY_ACTIVE_AT {
        RecoveryLevel::Active
    } else if count >= RECOVERY_LIGHT_AT {
        RecoveryLevel::Light
    } else {
        RecoveryLevel::None
    }
}

impl RecoveryState {
    pub fn level(&self) -> RecoveryLevel {
        self.level
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn activated_at(&self) -> Option<DateTime<Utc>> {
        self.activated_at
    }

    /// Record one stress signal and re-evaluate the level.
    /// A timestamp from the future is clamped to `now` rather than rejected;
    /// inconsistent input degrades to something safe, never an error.
    pub fn record(&mut self, mut signal: StressSignal, now: DateTime<Utc>) {
        if signal.timestamp > now {
            signal.timestamp = now;
        }
        self.last_signal_at = Some(signal.timestamp);
        self.window.push(signal, now);

        let count = self.window.len(now);
        if !self.is_active {
            if count >= RECOVERY_LIGHT_AT {
                self.is_active = true;
                self.activated_at = Some(now);
                self.level = level_for(count);
                info!(
                    "[engine] Recovery mode activated at level {:?} ({} signals in window)",
                    self.level, count
                );
            }
        } else {
            // Re-entrant accumulation: the level may only rise here.
            let candidate = level_for(count);
            if candidate > self.level {
                info!(
                    "[engine] Recovery level {:?} → {:?} ({} signals in window)",
                    self.level, candidate, count
                );
                self.level = candidate;
            }
        }
    }

    /// Periodic expiry check, invoked by the caller (not an internal timer).
    /// Resets to `none` when the most recent signal is older than 4 hours or
    /// no signal was ever recorded.
    pub fn check_expiry(&mut self, now: DateTime<Utc>) {
        if !self.is_active {
            return;
        }
        let expired = match self.last_signal_at {
            None => true,
            Some(ts) => now.signed_duration_since(ts) > Duration::seconds(RECOVERY_EXPIRY_SECS),
        };
        if expired {
            info!("[engine] Recovery mode expired (no stress signals in 4h)");
            self.reset(now);
        }
    }

    /// Manual deactivation: always allowed, unconditional reset.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        if self.is_active {
            info!("[engine] Recovery mode deactivated manually");
        }
        self.reset(now);
    }

    fn reset(&mut self, now: DateTime<Utc>) {
        if self.is_active {
            self.deactivated_at = Some(now);
        }
        self.level = RecoveryLevel::None;
        self.is_active = false;
        self.activated_at = None;
        self.window.clear();
    }

    /// Whether any stress signal landed within the rolling-window horizon,
    /// regardless of activation. Rapid short messages with stress evidence
    /// this fresh are stress, not busyness.
    pub fn has_recent_signal(&self, now: DateTime<Utc>) -> bool {
        self.last_signal_at.map_or(false, |ts| {
            now.signed_duration_since(ts) <= Duration::seconds(STRESS_WINDOW_MAX_AGE_SECS)
        })
    }

    /// Whether recovery was active within the last 24 hours but is off now.
    pub fn was_recently_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_active
            && self.deactivated_at.map_or(false, |ts| {
                now.signed_duration_since(ts) <= Duration::seconds(RECOVERY_RECENT_SECS)
            })
    }
}
