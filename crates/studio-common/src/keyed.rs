//! Keyed counter and cooldown state
//!
//! Owned maps from identifier to windowed counter or last-activity mark.
//! Components take one of these by value instead of reaching for ambient
//! globals, so a host can scope them per process, per session, or swap in
//! a distributed store behind the same shape.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Fixed-window attempt counter keyed by caller identifier
pub struct KeyedAttempts {
    entries: DashMap<String, AttemptSlot>,
    max_attempts: u32,
    window: Duration,
}

struct AttemptSlot {
    count: u32,
    window_start: Instant,
}

impl KeyedAttempts {
    /// New counter allowing `max_attempts` per `window` per key
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_attempts,
            window,
        }
    }

    /// Record an attempt; false when the key is over budget for this window
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut slot = self.entries.entry(key.to_string()).or_insert(AttemptSlot {
            count: 0,
            window_start: now,
        });

        if now.duration_since(slot.window_start) >= self.window {
            slot.count = 0;
            slot.window_start = now;
        }

        if slot.count >= self.max_attempts {
            return false;
        }

        slot.count += 1;
        true
    }

    /// Attempts left in the key's current window
    pub fn remaining(&self, key: &str) -> u32 {
        match self.entries.get(key) {
            Some(slot) if slot.window_start.elapsed() < self.window => {
                self.max_attempts.saturating_sub(slot.count)
            }
            _ => self.max_attempts,
        }
    }

    /// Drop all state for a key
    pub fn clear(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Last-activity cooldown keyed by caller identifier
pub struct KeyedCooldown {
    last: DashMap<String, Instant>,
    cooldown: Duration,
}

impl KeyedCooldown {
    /// New cooldown of the given length per key
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last: DashMap::new(),
            cooldown,
        }
    }

    /// True when the key has no activity inside the cooldown window
    pub fn ready(&self, key: &str) -> bool {
        match self.last.get(key) {
            Some(at) => at.elapsed() >= self.cooldown,
            None => true,
        }
    }

    /// Mark activity for the key if ready; false when still cooling down
    pub fn try_touch(&self, key: &str) -> bool {
        use dashmap::mapref::entry::Entry;

        let now = Instant::now();
        match self.last.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.cooldown {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Time left until the key is ready again
    pub fn remaining(&self, key: &str) -> Option<Duration> {
        let at = self.last.get(key)?;
        let elapsed = at.elapsed();
        if elapsed >= self.cooldown {
            None
        } else {
            Some(self.cooldown - elapsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_attempts_budget() {
        let attempts = KeyedAttempts::new(3, Duration::from_secs(60));
        assert!(attempts.try_acquire("a"));
        assert!(attempts.try_acquire("a"));
        assert!(attempts.try_acquire("a"));
        assert!(!attempts.try_acquire("a"));
        assert_eq!(attempts.remaining("a"), 0);
        // Other keys unaffected
        assert!(attempts.try_acquire("b"));
    }

    #[test]
    fn test_attempts_window_reset() {
        let attempts = KeyedAttempts::new(1, Duration::from_millis(30));
        assert!(attempts.try_acquire("a"));
        assert!(!attempts.try_acquire("a"));
        thread::sleep(Duration::from_millis(40));
        assert!(attempts.try_acquire("a"));
    }

    #[test]
    fn test_attempts_clear() {
        let attempts = KeyedAttempts::new(1, Duration::from_secs(60));
        assert!(attempts.try_acquire("a"));
        attempts.clear("a");
        assert!(attempts.try_acquire("a"));
    }

    #[test]
    fn test_cooldown_cycle() {
        let cooldown = KeyedCooldown::new(Duration::from_millis(30));
        assert!(cooldown.ready("u1"));
        assert!(cooldown.try_touch("u1"));
        assert!(!cooldown.try_touch("u1"));
        assert!(cooldown.remaining("u1").is_some());
        thread::sleep(Duration::from_millis(40));
        assert!(cooldown.ready("u1"));
        assert!(cooldown.try_touch("u1"));
    }
}
