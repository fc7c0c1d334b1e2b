//! Retry policies for attempt failures
//!
//! Decides whether a failed attempt should be retried and how long to wait
//! before the next one. The policy is stateless: every decision depends only
//! on the error and the zero-based attempt index.

use crate::backoff::{add_jitter, exponential_delay, Backoff};
use cutline_error::{AttemptError, CutlineError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// HTTP statuses retried by default
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [
    408, // Request Timeout
    429, // Too Many Requests
    500, // Internal Server Error
    502, // Bad Gateway
    503, // Service Unavailable
    504, // Gateway Timeout
];

/// Retry configuration
///
/// Deserializes from partial documents: missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retries after the first attempt; a call makes at most `max_retries + 1` attempts
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(with = "crate::duration_ms")]
    pub retry_delay: Duration,
    /// Growth factor applied per attempt
    pub backoff_multiplier: f64,
    /// Response statuses worth retrying
    pub retryable_status_codes: HashSet<u16>,
    /// Network error codes worth retrying
    pub retryable_errors: HashSet<ErrorCode>,
    /// Opt-in jitter factor; `None` keeps delays purely exponential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_factor: Option<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
            retryable_errors: [
                ErrorCode::ConnectionReset,
                ErrorCode::NotFound,
                ErrorCode::TimedOut,
                ErrorCode::ConnectionRefused,
            ]
            .into_iter()
            .collect(),
            jitter_factor: None,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Replace the retryable status codes
    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Replace the retryable network error codes
    pub fn with_retryable_errors<C: Into<ErrorCode>>(
        mut self,
        codes: impl IntoIterator<Item = C>,
    ) -> Self {
        self.retryable_errors = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Enable jitter (factor clamped to 0.0..=1.0)
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = Some(factor.clamp(0.0, 1.0));
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> cutline_error::Result<()> {
        if self.retry_delay.is_zero() {
            return Err(CutlineError::ConfigError(
                "retryDelay must be greater than 0".to_string(),
            ));
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier > 0.0) {
            return Err(CutlineError::ConfigError(format!(
                "backoffMultiplier must be a positive number, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

/// Exponential backoff retry policy
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from config
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the effective configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Maximum physical attempts for one call
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    /// Decide whether the attempt that just failed with `error` should be retried.
    ///
    /// `attempt` is zero-based. Always `false` once `attempt >= max_retries`.
    pub fn should_retry(&self, error: &AttemptError, attempt: u32) -> bool {
        if attempt >= self.config.max_retries {
            return false;
        }
        self.is_retryable(error)
    }

    /// Classify an error, ignoring the attempt budget.
    ///
    /// Circuit breaker rejections are never retryable.
    pub fn is_retryable(&self, error: &AttemptError) -> bool {
        if error.is_circuit_open() {
            return false;
        }

        if let Some(status) = error.status() {
            if self.config.retryable_status_codes.contains(&status) {
                return true;
            }
        }

        if let Some(code) = error.code() {
            if self.config.retryable_errors.contains(code) {
                return true;
            }
        }

        error.is_timeout()
    }

    /// Delay after the failed attempt `attempt`: `retry_delay * backoff_multiplier^attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        exponential_delay(self.config.retry_delay, self.config.backoff_multiplier, attempt)
    }

    /// Delay actually slept by the executor: [`delay`](Self::delay), plus
    /// jitter when the config opts in
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        match self.config.jitter_factor {
            Some(factor) => add_jitter(delay, factor),
            None => delay,
        }
    }

    /// Un-jittered delays for every retry the budget allows
    pub fn schedule(&self) -> Backoff {
        Backoff::new(
            self.config.retry_delay,
            self.config.backoff_multiplier,
            self.config.max_retries,
        )
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.retryable_status_codes.len(), 6);
        assert!(config.retryable_errors.contains(&ErrorCode::ConnectionReset));
        assert!(config.retryable_errors.contains(&ErrorCode::NotFound));
        assert!(config.retryable_errors.contains(&ErrorCode::TimedOut));
        assert!(config.retryable_errors.contains(&ErrorCode::ConnectionRefused));
        assert!(config.jitter_factor.is_none());
    }

    #[test]
    fn test_status_retryable() {
        let policy = policy();
        for status in DEFAULT_RETRYABLE_STATUS_CODES {
            assert!(policy.should_retry(&AttemptError::from_status(status), 0));
        }

        assert!(!policy.should_retry(&AttemptError::from_status(400), 0));
        assert!(!policy.should_retry(&AttemptError::from_status(404), 0));
        assert!(!policy.should_retry(&AttemptError::from_status(501), 0));
    }

    #[test]
    fn test_network_code_retryable() {
        let policy = policy();
        assert!(policy.should_retry(&AttemptError::network("ECONNRESET", "reset"), 0));
        assert!(policy.should_retry(&AttemptError::network("ECONNREFUSED", "refused"), 1));
        assert!(!policy.should_retry(&AttemptError::network("EPIPE", "broken pipe"), 0));
    }

    #[test]
    fn test_timeout_retryable() {
        let policy = policy();
        assert!(policy.should_retry(&AttemptError::network("ECONNABORTED", "aborted"), 0));
        assert!(policy.should_retry(&AttemptError::other("timeout of 1000ms exceeded"), 0));
    }

    #[test]
    fn test_generic_error_not_retryable() {
        assert!(!policy().should_retry(&AttemptError::other("invalid json"), 0));
    }

    #[test]
    fn test_circuit_open_never_retryable() {
        let err = AttemptError::CircuitOpen {
            name: "timeout-service".into(),
            retry_after: Duration::from_secs(1),
        };
        assert!(!policy().should_retry(&err, 0));
    }

    #[test]
    fn test_budget_exhausted() {
        let policy = RetryPolicy::new(RetryConfig::new().with_max_retries(2));
        let err = AttemptError::from_status(503);

        assert!(policy.should_retry(&err, 0));
        assert!(policy.should_retry(&err, 1));
        assert!(!policy.should_retry(&err, 2));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_zero_retries() {
        let policy = RetryPolicy::new(RetryConfig::new().with_max_retries(0));
        assert!(!policy.should_retry(&AttemptError::from_status(503), 0));
    }

    #[test]
    fn test_custom_codes() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .with_retryable_status_codes([409])
                .with_retryable_errors(["EPIPE"]),
        );

        assert!(policy.should_retry(&AttemptError::from_status(409), 0));
        assert!(!policy.should_retry(&AttemptError::from_status(503), 0));
        assert!(policy.should_retry(&AttemptError::network(ErrorCode::BrokenPipe, "pipe"), 0));
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .with_retry_delay(Duration::from_millis(100))
                .with_backoff_multiplier(2.0),
        );

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_is_opt_in() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .with_retry_delay(Duration::from_millis(100))
                .with_jitter(0.5),
        );

        for attempt in 0..4 {
            let base = policy.delay(attempt);
            let jittered = policy.backoff_delay(attempt);
            assert!(jittered >= base);
            assert!(jittered <= base + base / 2);
        }
    }

    #[test]
    fn test_schedule() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .with_max_retries(3)
                .with_retry_delay(Duration::from_millis(50)),
        );
        let delays: Vec<_> = policy.schedule().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(50),
                Duration::from_millis(100),
                Duration::from_millis(200)
            ]
        );
    }

    #[test]
    fn test_validate() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(RetryConfig::new().with_retry_delay(Duration::ZERO).validate().is_err());
        assert!(RetryConfig::new().with_backoff_multiplier(0.0).validate().is_err());
        assert!(RetryConfig::new().with_backoff_multiplier(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_config_deserializes_partial_document() {
        let config: RetryConfig = serde_json::from_str(
            r#"{"maxRetries": 2, "retryDelay": 100, "retryableErrors": ["ECONNRESET"]}"#,
        )
        .unwrap();

        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(100));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.retryable_errors.len(), 1);
        assert_eq!(config.retryable_status_codes.len(), 6);
    }

    proptest! {
        #[test]
        fn prop_no_retry_past_budget(max in 0u32..10, extra in 0u32..10, status in 100u16..600) {
            let policy = RetryPolicy::new(RetryConfig::new().with_max_retries(max));
            let errors = [
                AttemptError::from_status(status),
                AttemptError::network("ECONNRESET", "reset"),
                AttemptError::other("timeout"),
            ];
            for err in &errors {
                prop_assert!(!policy.should_retry(err, max + extra));
            }
        }

        #[test]
        fn prop_delay_is_exact(base_ms in 1u64..1_000, multiplier in 1u32..5, attempt in 0u32..6) {
            let policy = RetryPolicy::new(
                RetryConfig::new()
                    .with_retry_delay(Duration::from_millis(base_ms))
                    .with_backoff_multiplier(multiplier as f64),
            );
            let expected = base_ms * (multiplier as u64).pow(attempt);
            prop_assert_eq!(policy.delay(attempt), Duration::from_millis(expected));
        }
    }
}
