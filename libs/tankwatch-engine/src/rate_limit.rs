use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Rejected; the topic opens again after `retry_in`.
    Throttled { retry_in: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Per-topic debounce: at most one admitted event per topic every
/// `frequency`.
///
/// Only the last admitted instant is remembered, no credit accumulates.
/// A topic that was never seen is always admitted.
#[derive(Debug)]
pub struct RateLimiter {
    frequency: Duration,
    last_admitted: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(frequency: Duration) -> Self {
        Self {
            frequency,
            last_admitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    /// Admit or reject `topic` at `now`. Rejection leaves the state untouched.
    pub fn check(&self, topic: &str, now: Instant) -> Admission {
        let mut guard = match self.last_admitted.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("rate limiter lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };

        if let Some(last) = guard.get(topic) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.frequency {
                return Admission::Throttled {
                    retry_in: self.frequency - elapsed,
                };
            }
        }

        guard.insert(topic.to_string(), now);
        Admission::Admitted
    }

    pub fn admit(&self, topic: &str, now: Instant) -> bool {
        self.check(topic, now).is_admitted()
    }

    /// Number of topics admitted at least once.
    pub fn tracked_topics(&self) -> usize {
        match self.last_admitted.lock() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
