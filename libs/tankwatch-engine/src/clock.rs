use std::time::Instant;

use chrono::{DateTime, Utc};

/// Time source for the dispatcher.
///
/// `now` drives rate limiting and must be monotonic; `wall` stamps readings.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn wall(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
