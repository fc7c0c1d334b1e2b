//! HTTP transport
//!
//! The [`Transport`] trait is the only I/O primitive the client uses. One
//! call to [`Transport::send`] is one physical attempt; retries and circuit
//! breaking happen above it.

use async_trait::async_trait;
use cutline_error::{AttemptError, CutlineError, ErrorCode, ErrorContext, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::error::Error as StdError;
use std::time::Duration;

/// A request, before or after URL resolution
#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// HTTP method
    pub method: Method,
    /// Absolute URL, or a path relative to the client's base URL
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Query parameters appended to the URL
    pub query: Vec<(String, String)>,
    /// Request body, resent unchanged on every attempt
    pub body: Option<Vec<u8>>,
    /// Per-attempt timeout
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    /// Creates a request with no headers, query or body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Adds a header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a query parameter
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Sets a raw body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `body` as JSON and sets the content type
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let bytes = serde_json::to_vec(body).context("Failed to serialize request body")?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(bytes);
        Ok(self)
    }

    /// Sets the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A successful response
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Final URL, after redirects
    pub url: String,
    /// Raw body
    pub body: Vec<u8>,
}

impl Response {
    /// Status code as a number
    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Raw body bytes
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body deserialized from JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).context("Failed to decode response body")
    }
}

/// Performs one physical request/response exchange
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request`, whose URL is already absolute.
    ///
    /// Non-success statuses must be reported as [`AttemptError::Status`].
    async fn send(&self, request: &RequestSpec) -> std::result::Result<Response, AttemptError>;
}

/// Configuration for the HTTP client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpClientConfig {
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
    /// Idle connection timeout
    #[serde(with = "cutline_resilience::duration_ms")]
    pub pool_idle_timeout: Duration,
    /// Connection timeout
    #[serde(with = "cutline_resilience::duration_ms")]
    pub connect_timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Enable gzip compression
    pub gzip: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("Cutline/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
        }
    }
}

/// [`Transport`] backed by a pooled `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(&HttpClientConfig::default())
    }

    /// Creates a transport with custom configuration
    pub fn with_config(config: &HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(config.gzip)
            .build()
            .map_err(|e| CutlineError::TransportInit(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wraps an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestSpec) -> std::result::Result<Response, AttemptError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        tracing::trace!(method = %request.method, url = %request.url, "Sending request");

        let response = builder.send().await.map_err(attempt_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let body = response.bytes().await.map_err(attempt_error)?.to_vec();

        if !status.is_success() {
            return Err(AttemptError::Status {
                status: status.as_u16(),
                status_text: status.canonical_reason().map(str::to_string),
                body: Some(String::from_utf8_lossy(&body).into_owned()),
            });
        }

        Ok(Response {
            status,
            headers,
            url,
            body,
        })
    }
}

/// Classifies a `reqwest` failure.
///
/// Client-side timeouts become `ECONNABORTED`; connection failures carry the
/// code of the underlying I/O error when one can be found.
pub fn attempt_error(err: reqwest::Error) -> AttemptError {
    // the request URL stays out of the message so it cannot affect classification
    let err = err.without_url();
    let message = error_chain(&err);

    if err.is_timeout() {
        return AttemptError::network(ErrorCode::ConnectionAborted, message);
    }
    if let Some(status) = err.status() {
        return AttemptError::Status {
            status: status.as_u16(),
            status_text: status.canonical_reason().map(str::to_string),
            body: None,
        };
    }
    match network_code(&err) {
        Some(code) => AttemptError::network(code, message),
        None => AttemptError::other(message),
    }
}

fn network_code(err: &(dyn StdError + 'static)) -> Option<ErrorCode> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if let Some(code) = ErrorCode::from_io_kind(io.kind()) {
                return Some(code);
            }
        }
        if cause.to_string().contains("dns error") {
            return Some(ErrorCode::NotFound);
        }
        source = cause.source();
    }
    None
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
