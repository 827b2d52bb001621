//! Exponential backoff schedule for failed work items.

use std::time::Duration;

/// Backoff schedule applied to rate-limited re-adds.
///
/// The delay for an item with `n` prior consecutive failures is
/// `base * 2^n`, capped at `max`. Both bounds are explicit constructor
/// state so tests can use fast, deterministic schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,

    /// Upper bound on any computed delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with the given base and cap.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Compute the delay for an item that has failed `failures` times.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}
