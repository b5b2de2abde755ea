// ── Luma Engine: Rolling Window ────────────────────────────────────────────
//
// A time- and count-bounded history buffer with lazy eviction.
//
// Key properties:
//   - Bounded by both a maximum entry count and a maximum entry age
//   - Eviction happens lazily on read, never via background timers
//   - The age boundary is exclusive: an entry aged exactly `max_age` is
//     still inside the window; one second older is not
//   - NOT internally synchronized — there is a single writer per
//     conversation (the current turn), so the caller needs no locking here

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

pub struct RollingWindow<T> {
    entries: VecDeque<(T, DateTime<Utc>)>,
    cap: usize,
    max_age: Duration,
}

impl<T> RollingWindow<T> {
    pub fn new(cap: usize, max_age: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
            max_age,
        }
    }

    /// Push a new entry, evicting the oldest if the count cap is reached.
    pub fn push(&mut self, item: T, at: DateTime<Utc>) {
        if self.entries.len() >= self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back((item, at));
    }

    /// Drop entries strictly older than `max_age` as of `now`.
    fn evict(&mut self, now: DateTime<Utc>) {
        while let Some((_, ts)) = self.entries.front() {
            if now.signed_duration_since(*ts) > self.max_age {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of live entries at `now` (evicts first).
    pub fn len(&mut self, now: DateTime<Utc>) -> usize {
        self.evict(now);
        self.entries.len()
    }

    pub fn is_empty(&mut self, now: DateTime<Utc>) -> bool {
        self.len(now) == 0
    }

    /// Live entries in chronological order (evicts first).
    pub fn items(&mut self, now: DateTime<Utc>) -> impl Iterator<Item = &T> {
        self.evict(now);
        self.entries.iter().map(|(item, _)| item)
    }

    /// Timestamp of the most recent entry, if any. Does not evict:
    /// expiry checks need to see the newest entry even when it has aged out.
    pub fn newest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.back().map(|(_, ts)| *ts)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
