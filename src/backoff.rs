use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry-with-backoff policy for calls against a remote service.
///
/// One instance is configured per external call type (transcription job
/// polling, per-segment model invocation) rather than hardcoding delays at
/// each call site. `max_attempts` bounds retries for request/response calls;
/// polling loops additionally run under an overall deadline owned by the
/// caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds
    pub base_delay_ms: u64,

    /// Multiplier applied to the delay after each attempt
    pub multiplier: f64,

    /// Ceiling for a single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl BackoffPolicy {
    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exp as i32);
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }

    /// Whether another attempt is allowed after `attempt` attempts have run.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_with_attempts() {
        let policy = BackoffPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 10_000,
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = BackoffPolicy {
            max_attempts: 10,
            base_delay_ms: 1_000,
            multiplier: 10.0,
            max_delay_ms: 5_000,
        };

        assert_eq!(policy.delay_for(4), Duration::from_millis(5_000));
        // Large attempt counts must not overflow
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(5_000));
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = BackoffPolicy {
            max_attempts: 3,
            ..Default::default()
        };

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }
}
