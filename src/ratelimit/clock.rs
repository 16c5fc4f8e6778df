//! Wall clock used for transitions issued without an explicit timestamp.

use chrono::{DateTime, Utc};

/// Source of the current time for `allow` and `wait`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
