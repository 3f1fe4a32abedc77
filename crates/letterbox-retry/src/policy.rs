//! Backoff configuration.
//!
//! The wait before retry `n` (1-based, counting the attempt that just failed)
//! is
//!
//! ```text
//! min(backoff_max, backoff_min * 2^(n-1)) + uniform(0, jitter)
//! ```
//!
//! The exponential term is capped so waits stop growing; the jitter term
//! spreads independent callers apart so they do not hit a rate-limit window
//! in lockstep.

use std::time::Duration;

use rand::Rng;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default lower bound of the exponential term.
pub const DEFAULT_BACKOFF_MIN: Duration = Duration::from_millis(1500);

/// Default cap of the exponential term.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(6);

/// Default upper bound of the uniform jitter.
pub const DEFAULT_JITTER: Duration = Duration::from_millis(700);

/// Immutable retry configuration consumed by [`RetryingInvoker`].
///
/// [`RetryingInvoker`]: crate::RetryingInvoker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Base of the exponential term.
    pub backoff_min: Duration,
    /// Cap of the exponential term (jitter is added on top).
    pub backoff_max: Duration,
    /// Upper bound of the uniform random jitter.
    pub jitter: Duration,
    /// Bound on the whole invocation, sleeps included.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_min: DEFAULT_BACKOFF_MIN,
            backoff_max: DEFAULT_BACKOFF_MAX,
            jitter: DEFAULT_JITTER,
            timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Effective attempt budget (never zero).
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// The exponential term for the wait after failed attempt `attempt`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.backoff_min
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// The full wait after failed attempt `attempt`, jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay(attempt).saturating_add(self.sample_jitter())
    }

    fn sample_jitter(&self) -> Duration {
        let bound = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff_min, Duration::from_millis(1500));
        assert_eq!(policy.backoff_max, Duration::from_secs(6));
        assert_eq!(policy.jitter, Duration::from_millis(700));
        assert!(policy.timeout.is_none());
    }

    #[test]
    fn base_delay_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(1), Duration::from_millis(1500));
        assert_eq!(policy.base_delay(2), Duration::from_millis(3000));
        assert_eq!(policy.base_delay(3), Duration::from_secs(6));
        assert_eq!(policy.base_delay(4), Duration::from_secs(6));
    }

    #[test]
    fn base_delay_does_not_overflow() {
        let policy = RetryPolicy::default().with_backoff(Duration::from_secs(1), Duration::MAX);
        assert!(policy.base_delay(u32::MAX) >= Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy::default();
        for attempt in 1..=5 {
            for _ in 0..50 {
                let delay = policy.delay_for(attempt);
                let base = policy.base_delay(attempt);
                assert!(delay >= base);
                assert!(delay <= base + policy.jitter);
            }
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = RetryPolicy::default().with_jitter(Duration::ZERO);
        assert_eq!(policy.delay_for(2), policy.base_delay(2));
    }

    #[test]
    fn zero_attempts_behaves_as_one() {
        let policy = RetryPolicy::default().with_max_attempts(0);
        assert_eq!(policy.attempts(), 1);
    }
}
