//! # Cutline Resilience
//!
//! The resilience core of the Cutline HTTP client: it decides, for every
//! logical request, whether to attempt it, whether to retry it, and whether
//! to suppress it because the remote target is judged unhealthy.
//!
//! - **Circuit Breaker**: Stop issuing attempts to a target after repeated failures
//! - **Retry Policy**: Classify failures and compute exponential backoff delays
//! - **Executor**: Bounded, breaker-aware retry loop around a single attempt
//!
//! The transport itself is not part of this crate; anything that resolves to
//! `Result<T, AttemptError>` can be run by the executor.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cutline_resilience::{
//!     AttemptError, CircuitBreakerConfig, ResilientExecutor, RetryConfig,
//! };
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), AttemptError> {
//! let executor = ResilientExecutor::from_config(
//!     RetryConfig::new()
//!         .with_max_retries(2)
//!         .with_retry_delay(Duration::from_millis(100)),
//!     CircuitBreakerConfig::new("payments_api")
//!         .with_failure_threshold(3)
//!         .with_recovery_timeout(Duration::from_secs(1)),
//! );
//!
//! let body = executor
//!     .run(|| async {
//!         // Your single HTTP attempt here
//!         Ok::<_, AttemptError>("pong")
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Circuit Breaker
//!
//! ```rust
//! use cutline_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//! use std::time::Duration;
//!
//! let cb = CircuitBreaker::new(
//!     CircuitBreakerConfig::new("my_service")
//!         .with_failure_threshold(2)                     // Open after 2 failures
//!         .with_recovery_timeout(Duration::from_secs(30)), // Probe again after 30s
//! );
//!
//! cb.on_failure();
//! cb.on_failure();
//! assert_eq!(cb.state(), CircuitState::Open);
//! assert!(!cb.can_execute());
//!
//! cb.reset();
//! assert_eq!(cb.state(), CircuitState::Closed);
//! ```
//!
//! ## Retry Policy
//!
//! ```rust
//! use cutline_resilience::{AttemptError, RetryConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(RetryConfig::default());
//!
//! assert!(policy.should_retry(&AttemptError::from_status(503), 0)); // Service Unavailable
//! assert!(!policy.should_retry(&AttemptError::from_status(400), 0)); // Bad Request
//! assert!(!policy.should_retry(&AttemptError::from_status(503), 3)); // Budget spent
//!
//! assert_eq!(policy.delay(0), Duration::from_secs(1));
//! assert_eq!(policy.delay(2), Duration::from_secs(4));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod circuit_breaker;
pub mod duration_ms;
pub mod executor;
pub mod retry_policy;

// Re-export main types
pub use backoff::{add_jitter, exponential_delay, Backoff};

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState};

pub use executor::ResilientExecutor;

pub use retry_policy::{RetryConfig, RetryPolicy, DEFAULT_RETRYABLE_STATUS_CODES};

pub use cutline_error::{AttemptError, ErrorCode};
