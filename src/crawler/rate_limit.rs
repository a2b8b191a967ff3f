//! Pause between remote requests
//!
//! The pause accounts for the time the previous request already took, so the
//! spacing between request starts stays close to the configured interval
//! while never dropping below a floor.

use std::time::{Duration, Instant};

/// Interval-based delay calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    interval: Duration,
    minimum: Duration,
}

impl RateLimiter {
    pub fn new(interval: Duration, minimum: Duration) -> Self {
        Self { interval, minimum }
    }

    pub fn from_millis(interval_ms: u64, minimum_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(minimum_ms),
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn minimum(&self) -> Duration {
        self.minimum
    }

    /// `max(interval - elapsed, minimum)`
    pub fn delay_for(&self, elapsed: Duration) -> Duration {
        self.interval.saturating_sub(elapsed).max(self.minimum)
    }

    /// Delay for a request that started at `started`
    pub fn delay_since(&self, started: Instant) -> Duration {
        self.delay_for(started.elapsed())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_millis(10_000, 1_000)
    }
}
