//! Circuit breaker pattern implementation
//!
//! Stops issuing attempts to a target judged unhealthy. The `Open -> HalfOpen`
//! transition is computed lazily: it becomes visible the next time the breaker
//! is observed after the recovery timeout. There is no background timer.

use cutline_error::{AttemptError, CutlineError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed - requests flow normally
    Closed,
    /// Circuit is open - requests are rejected
    Open,
    /// Circuit is half-open - probing whether the target recovered
    HalfOpen,
}

impl CircuitState {
    /// Returns the canonical string form (`CLOSED`, `OPEN`, `HALF_OPEN`)
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for circuit breaker
///
/// Deserializes from partial documents: missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Name for logging/metrics
    pub name: String,
    /// Number of failures before opening circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before admitting a probe
    #[serde(with = "crate::duration_ms")]
    pub recovery_timeout: Duration,
    /// Observation window; carried in configuration, not used by transitions
    #[serde(with = "crate::duration_ms")]
    pub monitoring_period: Duration,
    /// Status codes expected from an unhealthy target; carried in
    /// configuration, not used by transitions
    pub expected_errors: HashSet<u16>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            recovery_timeout: Duration::from_millis(60_000),
            monitoring_period: Duration::from_millis(60_000),
            expected_errors: [500, 502, 503, 504].into_iter().collect(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set recovery timeout
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Set monitoring period
    pub fn with_monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period = period;
        self
    }

    /// Set expected error status codes
    pub fn with_expected_errors(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.expected_errors = codes.into_iter().collect();
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> cutline_error::Result<()> {
        if self.failure_threshold == 0 {
            return Err(CutlineError::ConfigError(
                "failureThreshold must be greater than 0".to_string(),
            ));
        }
        if self.recovery_timeout.is_zero() {
            return Err(CutlineError::ConfigError(
                "recoveryTimeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_state_change: Instant,
}

/// Circuit breaker for preventing cascading failures
///
/// All fields live behind one lock, so recomputing the state and acting on
/// it is a single critical section. The lock is never held across an await.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with config
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                last_state_change: Instant::now(),
            }),
        }
    }

    /// Create with default config and name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::new(CircuitBreakerConfig::new(name))
    }

    /// Returns the configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.update_state(&mut inner);
        inner.state
    }

    /// Check if circuit allows requests
    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Check if circuit is rejecting requests
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Like [`can_execute`](Self::can_execute), but describes the rejection
    pub fn check(&self) -> Result<(), AttemptError> {
        let mut inner = self.inner.lock();
        self.update_state(&mut inner);

        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner.last_state_change.elapsed();
        Err(AttemptError::CircuitOpen {
            name: self.config.name.clone(),
            retry_after: self.config.recovery_timeout.saturating_sub(elapsed),
        })
    }

    /// Record a successful operation
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;

        if inner.state == CircuitState::HalfOpen {
            self.transition_to(&mut inner, CircuitState::Closed);
        }
    }

    /// Record a failed operation
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        if inner.failure_count < self.config.failure_threshold {
            return;
        }

        match inner.state {
            // A late failure from an attempt admitted before the circuit
            // opened restarts the recovery window.
            CircuitState::Open => inner.last_state_change = Instant::now(),
            _ => self.transition_to(&mut inner, CircuitState::Open),
        }
    }

    /// Execute a single attempt with circuit breaker protection
    ///
    /// Rejects with [`AttemptError::CircuitOpen`] without polling `f` when the
    /// circuit is open; otherwise reports the outcome of `f` to the breaker.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, AttemptError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        self.check()?;

        match f().await {
            Ok(result) => {
                self.on_success();
                Ok(result)
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }

    /// Force the circuit closed and forget the failure history
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let previous = inner.state;

        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.last_state_change = Instant::now();

        tracing::info!(
            circuit = %self.config.name,
            from = %previous,
            "Circuit reset"
        );
    }

    /// Current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Get metrics
    pub fn metrics(&self) -> CircuitMetrics {
        let mut inner = self.inner.lock();
        self.update_state(&mut inner);

        CircuitMetrics {
            state: inner.state,
            failure_count: inner.failure_count,
            since_last_failure: inner.last_failure.map(|at| at.elapsed()),
            since_state_change: inner.last_state_change.elapsed(),
        }
    }

    fn update_state(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open
            && inner.last_state_change.elapsed() >= self.config.recovery_timeout
        {
            self.transition_to(inner, CircuitState::HalfOpen);
        }
    }

    fn transition_to(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.last_state_change = Instant::now();

        match to {
            CircuitState::Open => tracing::warn!(
                circuit = %self.config.name,
                %from,
                failures = inner.failure_count,
                "Circuit opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                circuit = %self.config.name,
                "Circuit half-open, admitting probe"
            ),
            CircuitState::Closed => tracing::info!(
                circuit = %self.config.name,
                "Circuit closed after successful recovery"
            ),
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "cutline_circuit_transitions_total",
            "circuit" => self.config.name.clone(),
            "to" => to.as_str()
        )
        .increment(1);
    }
}

/// Point-in-time view of a circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitMetrics {
    /// Current state
    pub state: CircuitState,
    /// Current consecutive failure count
    pub failure_count: u32,
    /// Time since the last recorded failure
    pub since_last_failure: Option<Duration>,
    /// Time since the last state change (or construction/reset)
    pub since_state_change: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn breaker(threshold: u32, recovery_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new("test")
                .with_failure_threshold(threshold)
                .with_recovery_timeout(Duration::from_millis(recovery_ms)),
        )
    }

    fn open(cb: &CircuitBreaker) {
        for _ in 0..cb.config().failure_threshold {
            cb.on_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::with_name("test");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
        assert!(!cb.is_open());
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.monitoring_period, Duration::from_secs(60));
        assert!(config.expected_errors.contains(&503));
        assert!(!config.expected_errors.contains(&429));
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let config = CircuitBreakerConfig::default().with_failure_threshold(0);
        assert!(config.validate().is_err());

        let config = CircuitBreakerConfig::default().with_recovery_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        assert!(CircuitBreakerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_state_strings() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let cb = breaker(3, 1000);

        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
        assert!(cb.is_open());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(3, 1000);

        cb.on_failure();
        cb.on_failure();
        cb.on_success();

        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_until_recovery_timeout() {
        let cb = breaker(2, 1000);
        open(&cb);

        advance(Duration::from_millis(999)).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.check().is_err());

        advance(Duration::from_millis(1)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_on_success() {
        let cb = breaker(2, 1000);
        open(&cb);

        advance(Duration::from_millis(1100)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.on_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_reopens_on_single_failure() {
        let cb = breaker(2, 1000);
        open(&cb);

        advance(Duration::from_millis(1100)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // the recovery window restarts from the reopen
        advance(Duration::from_millis(500)).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_reports_remaining_time() {
        let cb = breaker(1, 1000);
        cb.on_failure();

        advance(Duration::from_millis(400)).await;
        match cb.check() {
            Err(AttemptError::CircuitOpen { name, retry_after }) => {
                assert_eq!(name, "test");
                assert_eq!(retry_after, Duration::from_millis(600));
            }
            other => panic!("expected circuit open, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_is_immediate() {
        let cb = breaker(2, 60_000);
        open(&cb);
        assert_eq!(cb.failure_count(), 2);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert!(cb.metrics().since_last_failure.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_observation_is_idempotent() {
        let cb = breaker(1, 1000);
        cb.on_failure();

        for _ in 0..5 {
            assert_eq!(cb.state(), CircuitState::Open);
            assert!(!cb.can_execute());
        }

        advance(Duration::from_millis(1000)).await;
        for _ in 0..5 {
            assert_eq!(cb.state(), CircuitState::HalfOpen);
            assert!(cb.can_execute());
        }
    }

    #[tokio::test]
    async fn test_execute_success() {
        let cb = CircuitBreaker::with_name("test");

        let result = cb.execute(|| async { Ok::<_, AttemptError>(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_execute_failure_counted() {
        let cb = breaker(2, 1000);

        let _ = cb
            .execute(|| async { Err::<(), _>(AttemptError::from_status(500)) })
            .await;
        assert_eq!(cb.failure_count(), 1);

        let _ = cb
            .execute(|| async { Err::<(), _>(AttemptError::from_status(500)) })
            .await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_execute_skips_operation_when_open() {
        let cb = breaker(1, 60_000);
        cb.on_failure();

        let mut invoked = false;
        let result = cb
            .execute(|| {
                invoked = true;
                async { Ok::<_, AttemptError>(()) }
            })
            .await;

        assert!(!invoked);
        assert!(result.unwrap_err().is_circuit_open());
        // a rejection is not a failure observation
        assert_eq!(cb.failure_count(), 1);
    }

    #[test]
    fn test_metrics() {
        let cb = CircuitBreaker::with_name("test");
        cb.on_failure();
        cb.on_failure();

        let metrics = cb.metrics();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.failure_count, 2);
        assert!(metrics.since_last_failure.is_some());
    }

    #[test]
    fn test_config_deserializes_partial_document() {
        let config: CircuitBreakerConfig =
            serde_json::from_str(r#"{"failureThreshold": 2, "recoveryTimeout": 1000}"#).unwrap();

        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.recovery_timeout, Duration::from_secs(1));
        assert_eq!(config.monitoring_period, Duration::from_secs(60));
        assert_eq!(config.name, "default");
    }
}
