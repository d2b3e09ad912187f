//! Retry policy for the delegated activity.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::ActivityFailure;
use crate::config::RetryConfig;

/// Bounded exponential backoff with non-retryable error classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    /// Total attempts including the first one
    pub maximum_attempts: u32,
    pub non_retryable_error_types: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            backoff_coefficient: config.backoff_coefficient,
            maximum_interval: Duration::from_millis(config.maximum_interval_ms),
            maximum_attempts: config.maximum_attempts.max(1),
            non_retryable_error_types: config.non_retryable_error_types.clone(),
        }
    }
}

impl RetryPolicy {
    /// Delay before scheduling attempt `failed_attempt + 1`
    pub fn delay_for_attempt(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(63) as i32;
        let factor = self.backoff_coefficient.powi(exponent);
        // Out-of-range products saturate to the cap instead of overflowing
        Duration::try_from_secs_f64(self.initial_interval.as_secs_f64() * factor)
            .unwrap_or(self.maximum_interval)
            .min(self.maximum_interval)
    }

    pub fn is_non_retryable(&self, error_type: &str) -> bool {
        self.non_retryable_error_types
            .iter()
            .any(|candidate| candidate == error_type)
    }

    /// Whether a failure of `attempt` should be followed by another attempt
    pub fn should_retry(&self, attempt: u32, failure: &ActivityFailure) -> bool {
        !failure.non_retryable
            && !self.is_non_retryable(&failure.error_type)
            && attempt < self.maximum_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::error_types;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(5),
            maximum_attempts: 3,
            non_retryable_error_types: vec![error_types::INVALID_INPUT.to_string()],
        }
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = policy();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(200), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_intervals_saturate_to_maximum() {
        let policy = RetryPolicy {
            initial_interval: Duration::from_millis(u64::MAX),
            backoff_coefficient: 10.0,
            maximum_interval: Duration::from_secs(60),
            ..policy()
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_secs(60));
    }

    #[test]
    fn test_attempts_are_bounded() {
        let policy = policy();
        let failure = ActivityFailure::retryable("boom", error_types::ENGINE_FAILURE);
        assert!(policy.should_retry(1, &failure));
        assert!(policy.should_retry(2, &failure));
        assert!(!policy.should_retry(3, &failure));
    }

    #[test]
    fn test_non_retryable_classes() {
        let policy = policy();
        let invalid = ActivityFailure::retryable("bad payload", error_types::INVALID_INPUT);
        assert!(!policy.should_retry(1, &invalid));

        let flagged = ActivityFailure::non_retryable("stop", error_types::ENGINE_FAILURE);
        assert!(!policy.should_retry(1, &flagged));
    }
}
