//! Breaker-aware retry loop
//!
//! Runs a single-attempt operation up to `max_retries + 1` times. Every
//! physical attempt goes through the circuit breaker, so one logical call
//! that retries N times is N observations for the breaker.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::retry_policy::{RetryConfig, RetryPolicy};
use cutline_error::AttemptError;
use std::future::Future;
use std::sync::Arc;

/// Composes a [`RetryPolicy`] and a shared [`CircuitBreaker`]
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl ResilientExecutor {
    /// Create an executor over an existing breaker
    pub fn new(policy: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self { policy, breaker }
    }

    /// Create an executor with its own breaker
    pub fn from_config(retry: RetryConfig, circuit_breaker: CircuitBreakerConfig) -> Self {
        Self::new(
            RetryPolicy::new(retry),
            Arc::new(CircuitBreaker::new(circuit_breaker)),
        )
    }

    /// The retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The circuit breaker shared by every call through this executor
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `operation` under the retry loop.
    ///
    /// Returns the first success, or the last failure once the policy stops
    /// retrying. A circuit breaker rejection is never retried, so an open
    /// circuit fails the call after one iteration without invoking
    /// `operation`.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, AttemptError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max_retries = self.policy.config().max_retries;
        let mut attempt: u32 = 0;

        let schedule = self.policy.schedule();
        tracing::trace!(
            circuit = %self.breaker.config().name,
            max_attempts = self.policy.max_attempts(),
            retries = schedule.len(),
            worst_case_sleep = ?schedule.total(),
            "Starting call"
        );

        loop {
            let error = match self.breaker.execute(|| operation()).await {
                Ok(result) => {
                    record_attempt("success");
                    return Ok(result);
                }
                Err(error) => error,
            };

            if error.is_circuit_open() {
                record_attempt("rejected");
                tracing::debug!(
                    circuit = %self.breaker.config().name,
                    attempt,
                    "Attempt rejected by open circuit"
                );
            } else {
                record_attempt("failure");
                tracing::debug!(
                    attempt,
                    max_retries,
                    error = %error,
                    "Attempt failed"
                );
            }

            // `should_retry` is false once `attempt >= max_retries`, which bounds the loop
            if !self.policy.should_retry(&error, attempt) {
                return Err(error);
            }

            let delay = self.policy.backoff_delay(attempt);
            tracing::trace!(attempt, delay = ?delay, "Waiting before retry");
            tokio::time::sleep(delay).await;

            attempt += 1;
        }
    }
}

#[cfg(feature = "metrics")]
fn record_attempt(outcome: &'static str) {
    metrics::counter!("cutline_retry_attempts_total", "outcome" => outcome).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_attempt(_outcome: &'static str) {}
