//! Retry policy for adapter invocations.
//!
//! Only `RateLimited` and `Timeout` failures are retried. A server-supplied
//! `retry_after` is honoured as given; otherwise the delay grows
//! exponentially from the configured base, capped at `max_backoff`.

use std::time::Duration;

use crate::domain::config::RetryConfig;
use crate::domain::errors::AdapterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    max_attempts: u32,
    backoff_base: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            max_backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_secs(config.max_backoff_secs),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the next attempt, or `None` when `error` after
    /// `attempt` attempts must be reported as final.
    pub fn next_delay(&self, attempt: u32, error: &AdapterError) -> Option<Duration> {
        if !error.is_retryable() || attempt >= self.max_attempts {
            return None;
        }
        match error {
            AdapterError::RateLimited {
                retry_after: Some(delay),
            } => Some(*delay),
            _ => Some(self.calculate_delay(attempt)),
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(2u32.pow(exponent))
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AdapterError::Timeout, true)]
    #[case(AdapterError::RateLimited { retry_after: None }, true)]
    #[case(AdapterError::auth("bad token"), false)]
    #[case(AdapterError::invalid("missing title"), false)]
    #[case(AdapterError::remote(Some(500), "boom"), false)]
    fn test_only_transient_failures_are_retried(#[case] error: AdapterError, #[case] retried: bool) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(1, &error).is_some(), retried);
    }

    #[test]
    fn test_retry_after_is_honoured() {
        let policy = RetryPolicy::default();
        let error = AdapterError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(policy.next_delay(1, &error), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(2, &error), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(3, &error), None);
    }

    #[rstest]
    #[case(1, 500)]
    #[case(2, 1000)]
    #[case(3, 2000)]
    #[case(7, 30_000)]
    fn test_exponential_backoff_is_capped(#[case] attempt: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy::new(10, Duration::from_millis(500), Duration::from_secs(30));
        assert_eq!(
            policy.next_delay(attempt, &AdapterError::Timeout),
            Some(Duration::from_millis(expected_ms))
        );
    }
}
