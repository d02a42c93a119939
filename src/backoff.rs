//! Exponential retry delay for the poll loop.

use std::time::Duration;

/// Delay before the next poll after a failure.
///
/// Doubles on every failure, never past `max`, and snaps back to `initial`
/// on success. If doubling would overshoot `max` the delay stays where it is.
#[derive(Debug, Clone)]
pub struct BackoffScheduler {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl BackoffScheduler {
    pub const DEFAULT_INITIAL: Duration = Duration::from_millis(125);
    pub const DEFAULT_MAX: Duration = Duration::from_secs(257);

    /// `initial` is clamped to `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn on_success(&mut self) {
        self.current = self.initial;
    }

    /// Advance the delay and return how long to sleep before retrying.
    pub fn on_failure(&mut self) -> Duration {
        let doubled = self.current.saturating_mul(2);
        if doubled <= self.max {
            self.current = doubled;
        }
        self.current
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial
    }

    pub fn max_delay(&self) -> Duration {
        self.max
    }
}

impl Default for BackoffScheduler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INITIAL, Self::DEFAULT_MAX)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
