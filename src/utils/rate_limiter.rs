use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Limits how often a log message keyed by a string is allowed to fire, so that a caller hammering
/// a write path against an undefined metric doesn't flood the logs.
///
/// One entry is kept per distinct key; the first occurrence of a key always fires, subsequent
/// occurrences are suppressed until `period` has elapsed since the last one that fired.
pub struct RateLimiter {
    period: Duration,
    last_fired: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true if the caller should log for `key` right now.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut last_fired = self.last_fired.lock().unwrap();
        match last_fired.get_mut(key) {
            Some(previous) if now.duration_since(*previous) < self.period => false,
            Some(previous) => {
                *previous = now;
                true
            }
            None => {
                last_fired.insert(key.to_string(), now);
                true
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_occurrence_always_fires() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow("/undefined/metric"));
    }

    #[test]
    fn test_second_occurrence_is_suppressed() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow("/undefined/metric"));
        assert!(!limiter.allow("/undefined/metric"));
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow("/foo"));
        assert!(limiter.allow("/bar"));
    }

    #[test]
    fn test_fires_again_after_period_elapses() {
        let limiter = RateLimiter::new(Duration::from_millis(10));
        assert!(limiter.allow("/foo"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.allow("/foo"));
    }
}
