//! Exponential backoff with jitter for transient provider failures.

use std::time::Duration;

/// Fraction of the computed delay added or removed at random.
const JITTER_FACTOR: f64 = 0.25;

/// Retry policy applied to a single logical request.
///
/// Total attempts = `max_retries + 1`. Retries are always sequential.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based) without jitter, capped at `max_delay`.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let seconds = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(62) as i32);
        Duration::from_secs_f64(seconds.min(self.max_delay.as_secs_f64()))
    }

    /// Delay before retry number `attempt` with +/-25% jitter, never above `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let seconds = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(62) as i32);
        let jitter = 1.0 + JITTER_FACTOR * (fastrand::f64() * 2.0 - 1.0);
        let jittered = (seconds * jitter).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_base_delay_doubles_until_cap() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.base_delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.base_delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(policy.base_delay_for_attempt(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_secs(2));
        for attempt in 0..10 {
            let base = policy.base_delay_for_attempt(attempt).as_secs_f64();
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt);
                assert!(delay <= policy.max_delay);
                assert!(delay.as_secs_f64() >= base * 0.75 - 1e-9);
            }
        }
    }

    #[test]
    fn test_expected_delay_non_decreasing() {
        let policy = RetryPolicy::new(8, Duration::from_millis(50), Duration::from_secs(1));
        let mut previous = 0.0;
        for attempt in 0..8 {
            let mean: f64 = (0..200)
                .map(|_| policy.delay_for_attempt(attempt).as_secs_f64())
                .sum::<f64>()
                / 200.0;
            // Jitter averages out; allow a little slack at the cap.
            assert!(mean >= previous * 0.9, "attempt {attempt}: {mean} < {previous}");
            previous = mean;
        }
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for_attempt(u32::MAX) <= policy.max_delay);
    }
}
