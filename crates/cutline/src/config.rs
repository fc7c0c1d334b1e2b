//! Client configuration
//!
//! Every section deserializes from a partial document and falls back to its
//! defaults, so `{"retry": {"maxRetries": 5}}` is a complete configuration.

use crate::transport::HttpClientConfig;
use cutline_error::{CutlineError, ErrorContext, Result};
use cutline_resilience::{CircuitBreakerConfig, RetryConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Configuration for a [`Cutline`](crate::Cutline) client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CutlineConfig {
    /// Prefix for relative request URLs
    #[serde(rename = "baseURL", alias = "baseUrl", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-attempt timeout applied when a request sets none
    #[serde(
        with = "cutline_resilience::duration_ms::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    /// Headers sent with every request unless the request overrides them
    pub headers: BTreeMap<String, String>,
    /// Retry policy
    pub retry: RetryConfig,
    /// Circuit breaker
    pub circuit_breaker: CircuitBreakerConfig,
    /// Underlying HTTP client tuning
    pub http: HttpClientConfig,
}

impl CutlineConfig {
    /// Creates a configuration with every default
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document, merging it over the defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse client configuration")
    }

    /// Sets the base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a default header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the circuit breaker
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Sets the HTTP client tuning
    pub fn with_http(mut self, http: HttpClientConfig) -> Self {
        self.http = http;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        self.parsed_base_url()?;
        self.header_map()?;
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        Ok(())
    }

    /// The base URL, parsed
    pub fn parsed_base_url(&self) -> Result<Option<Url>> {
        self.base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| CutlineError::InvalidUrl {
                    url: raw.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// The default headers as a header map
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CutlineError::ConfigError(format!("header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| CutlineError::ConfigError(format!("header '{name}': {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}
