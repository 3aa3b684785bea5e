//! Exponential backoff for retry loops
// (c) 2024 Ross Younger

use std::time::Duration;

/// Retry delay tracker.
///
/// The first failure waits `base`; each consecutive failure doubles the wait, up to `max`.
/// A success resets the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl ExponentialBackoff {
    /// Delay after the first failed accept
    pub const ACCEPT_BASE: Duration = Duration::from_millis(10);
    /// Ceiling for accept retries
    pub const ACCEPT_MAX: Duration = Duration::from_secs(1);

    /// Constructor
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
        }
    }

    /// The delay to apply for a given number of consecutive failures (1-indexed).
    /// Zero failures means no delay.
    #[must_use]
    pub fn delay_for_failures(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        // 2^10 is far beyond any useful cap
        let exponent = (failures - 1).min(10);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }

    /// Records a failure and returns how long to wait before retrying
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.delay_for_failures(self.failures)
    }

    /// Records a success
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Number of consecutive failures recorded
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Self::ACCEPT_BASE, Self::ACCEPT_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::ExponentialBackoff;
    use std::time::Duration;

    #[test]
    fn doubles_then_caps() {
        let mut b = ExponentialBackoff::default();
        let delays: Vec<_> = (0..9).map(|_| b.next_delay().as_millis()).collect();
        assert_eq!(delays, [10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
        assert_eq!(b.failures(), 9);
    }

    #[test]
    fn reset_starts_over() {
        let mut b = ExponentialBackoff::default();
        let _ = b.next_delay();
        let _ = b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn no_failures_no_delay() {
        let b = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(b.delay_for_failures(0), Duration::ZERO);
        assert_eq!(b.delay_for_failures(100), Duration::from_secs(5));
    }
}
