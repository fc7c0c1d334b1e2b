use crate::config::CutlineConfig;
use crate::transport::{ReqwestTransport, RequestSpec, Response, Transport};
use cutline_error::{CutlineError, Result};
use cutline_resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ResilientExecutor, RetryConfig,
    RetryPolicy,
};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// HTTP client with retries and a circuit breaker.
///
/// Every request, whatever its verb, goes through one [`ResilientExecutor`].
/// All requests made by a client (and its clones) share a single breaker.
pub struct Cutline<T: Transport = ReqwestTransport> {
    config: CutlineConfig,
    base_url: Option<Url>,
    default_headers: HeaderMap,
    executor: ResilientExecutor,
    transport: Arc<T>,
}

impl<T: Transport> Clone for Cutline<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            base_url: self.base_url.clone(),
            default_headers: self.default_headers.clone(),
            executor: self.executor.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: Transport> std::fmt::Debug for Cutline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cutline")
            .field("base_url", &self.config.base_url)
            .field("circuit", &self.config.circuit_breaker.name)
            .field("state", &self.circuit_breaker_state())
            .finish()
    }
}

impl Cutline<ReqwestTransport> {
    /// Creates a client backed by `reqwest`
    pub fn new(config: CutlineConfig) -> Result<Self> {
        let transport = ReqwestTransport::with_config(&config.http)?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> Cutline<T> {
    /// Creates a client over a custom transport
    pub fn with_transport(mut config: CutlineConfig, transport: T) -> Result<Self> {
        config.validate()?;

        let base_url = config.parsed_base_url()?;
        let default_headers = config.header_map()?;

        // An unnamed breaker takes the name of the host it protects
        if config.circuit_breaker.name == CircuitBreakerConfig::default().name {
            if let Some(host) = base_url.as_ref().and_then(Url::host_str) {
                config.circuit_breaker.name = host.to_string();
            }
        }

        let executor = ResilientExecutor::new(
            RetryPolicy::new(config.retry.clone()),
            Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())),
        );

        tracing::debug!(
            base_url = ?config.base_url,
            circuit = %config.circuit_breaker.name,
            max_retries = config.retry.max_retries,
            "Created client"
        );

        Ok(Self {
            config,
            base_url,
            default_headers,
            executor,
            transport: Arc::new(transport),
        })
    }

    /// Sends a request through the retry loop and circuit breaker
    pub async fn request(&self, request: RequestSpec) -> Result<Response> {
        let prepared = self.prepare(request)?;

        tracing::debug!(method = %prepared.method, url = %prepared.url, "Dispatching request");

        let response = self
            .executor
            .run(|| self.transport.send(&prepared))
            .await
            .map_err(|error| {
                tracing::warn!(
                    method = %prepared.method,
                    url = %prepared.url,
                    error = %error,
                    "Request failed"
                );
                CutlineError::from(error)
            })?;

        Ok(response)
    }

    /// GET `url`
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request(RequestSpec::new(Method::GET, url)).await
    }

    /// DELETE `url`
    pub async fn delete(&self, url: &str) -> Result<Response> {
        self.request(RequestSpec::new(Method::DELETE, url)).await
    }

    /// HEAD `url`
    pub async fn head(&self, url: &str) -> Result<Response> {
        self.request(RequestSpec::new(Method::HEAD, url)).await
    }

    /// OPTIONS `url`
    pub async fn options(&self, url: &str) -> Result<Response> {
        self.request(RequestSpec::new(Method::OPTIONS, url)).await
    }

    /// POST `body` as JSON to `url`
    pub async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response> {
        self.request(RequestSpec::new(Method::POST, url).with_json(body)?)
            .await
    }

    /// PUT `body` as JSON to `url`
    pub async fn put<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response> {
        self.request(RequestSpec::new(Method::PUT, url).with_json(body)?)
            .await
    }

    /// PATCH `body` as JSON to `url`
    pub async fn patch<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response> {
        self.request(RequestSpec::new(Method::PATCH, url).with_json(body)?)
            .await
    }

    /// The fully resolved URL `request` would be sent to, query included
    pub fn uri(&self, request: &RequestSpec) -> Result<Url> {
        let mut url = self.resolve(&request.url)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    /// The effective configuration
    pub fn config(&self) -> &CutlineConfig {
        &self.config
    }

    /// Current breaker state
    pub fn circuit_breaker_state(&self) -> CircuitState {
        self.executor.breaker().state()
    }

    /// Forces the breaker back to closed
    pub fn reset_circuit_breaker(&self) {
        self.executor.breaker().reset();
    }

    /// Consecutive failures seen by the breaker
    pub fn failure_count(&self) -> u32 {
        self.executor.breaker().failure_count()
    }

    /// The retry configuration
    pub fn retry_config(&self) -> &RetryConfig {
        self.executor.policy().config()
    }

    /// The breaker configuration
    pub fn circuit_breaker_config(&self) -> &CircuitBreakerConfig {
        self.executor.breaker().config()
    }

    /// The shared circuit breaker
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        self.executor.breaker()
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn prepare(&self, request: RequestSpec) -> Result<RequestSpec> {
        let url = self.uri(&request)?;

        let mut headers = self.default_headers.clone();
        for name in request.headers.keys() {
            headers.remove(name);
        }
        headers.extend(request.headers);

        Ok(RequestSpec {
            method: request.method,
            url: url.into(),
            headers,
            query: Vec::new(),
            body: request.body,
            timeout: request.timeout.or(self.config.timeout),
        })
    }

    fn resolve(&self, raw: &str) -> Result<Url> {
        // `users:search` parses with a `users` scheme; only hierarchical URLs are absolute
        if let Ok(url) = Url::parse(raw) {
            if !url.cannot_be_a_base() {
                return Ok(url);
            }
        }

        let base = self.base_url.as_ref().ok_or_else(|| CutlineError::InvalidUrl {
            url: raw.to_string(),
            reason: "relative URL without a base URL".to_string(),
        })?;

        let joined = combine_urls(base.as_str(), raw);
        Url::parse(&joined).map_err(|e| CutlineError::InvalidUrl {
            url: joined,
            reason: e.to_string(),
        })
    }
}

/// Joins a base URL and a relative path with exactly one slash between them
fn combine_urls(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}
