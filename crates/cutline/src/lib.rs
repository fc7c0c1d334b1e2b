//! # Cutline
//!
//! An HTTP client that retries transient failures with exponential backoff
//! and stops calling an unhealthy target through a circuit breaker.
//!
//! ## Features
//!
//! - Retries on configurable status codes and network error codes
//! - One circuit breaker per client, shared by every request and clone
//! - Partial JSON configuration merged over defaults
//! - Pluggable [`Transport`], with a pooled `reqwest` implementation
//!
//! ## Example
//!
//! ```rust,no_run
//! use cutline::{Cutline, CutlineConfig};
//!
//! # async fn example() -> cutline::Result<()> {
//! let config = CutlineConfig::from_json_str(
//!     r#"{
//!         "baseURL": "https://api.example.com",
//!         "retry": {"maxRetries": 2, "retryDelay": 200},
//!         "circuitBreaker": {"failureThreshold": 3, "recoveryTimeout": 10000}
//!     }"#,
//! )?;
//!
//! let client = Cutline::new(config)?;
//! let users: serde_json::Value = client.get("/users").await?.json()?;
//!
//! println!("{users} ({})", client.circuit_breaker_state());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
pub mod config;
pub mod transport;

pub use client::Cutline;
pub use config::CutlineConfig;
pub use transport::{HttpClientConfig, ReqwestTransport, RequestSpec, Response, Transport};

pub use cutline_error::{AttemptError, CutlineError, ErrorCode, ErrorContext, Result};
pub use cutline_resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState, RetryConfig, RetryPolicy,
};

pub use reqwest::{header, Method, StatusCode};
