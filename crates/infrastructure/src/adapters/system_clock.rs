//! Wall-clock adapter

use chrono::{DateTime, Utc};
use squadup_application::ports::Clock;

/// Reads the system wall clock. Token expiry and the verification
/// throttle are measured against it in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
