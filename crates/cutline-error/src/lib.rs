//! # Cutline Error
//!
//! This crate provides the error types shared by the Cutline crates.
//!
//! ## Error Categories
//!
//! - [`AttemptError`] - The outcome of one failed physical attempt
//! - [`ErrorCode`] - Socket-level error codes carried by network failures
//! - [`CutlineError`] - Top-level error for configuration and client setup
//!
//! ## Example
//!
//! ```
//! use cutline_error::{AttemptError, ErrorCode};
//!
//! let err = AttemptError::network(ErrorCode::ConnectionRefused, "connect failed");
//! assert_eq!(err.code(), Some(&ErrorCode::ConnectionRefused));
//! assert_eq!(err.status(), None);
//!
//! let err = AttemptError::from_status(503);
//! assert_eq!(err.status(), Some(503));
//! assert_eq!(err.to_string(), "Request failed with status code 503");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Socket-level error codes reported by a transport.
///
/// The string forms are the conventional socket error names, so configuration
/// documents can list them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `ECONNRESET`
    ConnectionReset,
    /// `ENOTFOUND` (name resolution failed)
    NotFound,
    /// `ETIMEDOUT`
    TimedOut,
    /// `ECONNREFUSED`
    ConnectionRefused,
    /// `ECONNABORTED` (the request was aborted, usually by a client timeout)
    ConnectionAborted,
    /// `EPIPE`
    BrokenPipe,
    /// `EHOSTUNREACH`
    HostUnreachable,
    /// `ENETUNREACH`
    NetworkUnreachable,
    /// `EAI_AGAIN` (temporary resolver failure)
    DnsTemporaryFailure,
    /// Any other code, kept verbatim
    Other(String),
}

impl ErrorCode {
    /// Returns the conventional string form of the code
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::ConnectionReset => "ECONNRESET",
            ErrorCode::NotFound => "ENOTFOUND",
            ErrorCode::TimedOut => "ETIMEDOUT",
            ErrorCode::ConnectionRefused => "ECONNREFUSED",
            ErrorCode::ConnectionAborted => "ECONNABORTED",
            ErrorCode::BrokenPipe => "EPIPE",
            ErrorCode::HostUnreachable => "EHOSTUNREACH",
            ErrorCode::NetworkUnreachable => "ENETUNREACH",
            ErrorCode::DnsTemporaryFailure => "EAI_AGAIN",
            ErrorCode::Other(code) => code,
        }
    }

    /// Maps an I/O error kind onto a code, when one corresponds
    pub fn from_io_kind(kind: std::io::ErrorKind) -> Option<Self> {
        use std::io::ErrorKind;

        match kind {
            ErrorKind::ConnectionReset => Some(ErrorCode::ConnectionReset),
            ErrorKind::ConnectionRefused => Some(ErrorCode::ConnectionRefused),
            ErrorKind::ConnectionAborted => Some(ErrorCode::ConnectionAborted),
            ErrorKind::TimedOut => Some(ErrorCode::TimedOut),
            ErrorKind::BrokenPipe => Some(ErrorCode::BrokenPipe),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "ECONNRESET" => ErrorCode::ConnectionReset,
            "ENOTFOUND" => ErrorCode::NotFound,
            "ETIMEDOUT" => ErrorCode::TimedOut,
            "ECONNREFUSED" => ErrorCode::ConnectionRefused,
            "ECONNABORTED" => ErrorCode::ConnectionAborted,
            "EPIPE" => ErrorCode::BrokenPipe,
            "EHOSTUNREACH" => ErrorCode::HostUnreachable,
            "ENETUNREACH" => ErrorCode::NetworkUnreachable,
            "EAI_AGAIN" => ErrorCode::DnsTemporaryFailure,
            other => ErrorCode::Other(other.to_string()),
        })
    }
}

impl From<&str> for ErrorCode {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(code) => code,
            Err(never) => match never {},
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ErrorCode::from(raw.as_str()))
    }
}

/// The failure produced by a single physical attempt.
///
/// Retry classification only looks at [`status`](Self::status),
/// [`code`](Self::code) and the rendered message, so transports are free to
/// build whichever variant describes their failure best.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// The remote answered with a non-success status
    #[error("Request failed with status code {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase, if known
        status_text: Option<String>,
        /// Response body, if it could be read
        body: Option<String>,
    },

    /// The exchange failed below HTTP
    #[error("{message} ({code})")]
    Network {
        /// Socket-level code
        code: ErrorCode,
        /// Human-readable description
        message: String,
    },

    /// The circuit breaker rejected the attempt before it was issued
    #[error("Circuit '{name}' is open, retry after {retry_after:?}")]
    CircuitOpen {
        /// Name of the circuit breaker
        name: String,
        /// Time until the breaker will admit a probe
        retry_after: Duration,
    },

    /// Anything else
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl AttemptError {
    /// Creates a status failure without reason phrase or body
    pub fn from_status(status: u16) -> Self {
        AttemptError::Status {
            status,
            status_text: None,
            body: None,
        }
    }

    /// Creates a network failure
    pub fn network(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        AttemptError::Network {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a generic failure
    pub fn other(message: impl Into<String>) -> Self {
        AttemptError::Other {
            message: message.into(),
        }
    }

    /// Response status, if the remote answered
    pub fn status(&self) -> Option<u16> {
        match self {
            AttemptError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Network error code, if the failure happened below HTTP
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            AttemptError::Network { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns true if this is a circuit breaker rejection
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, AttemptError::CircuitOpen { .. })
    }

    /// Returns true if the failure signals a timeout: the aborted code, or a
    /// network or generic message mentioning `timeout`
    pub fn is_timeout(&self) -> bool {
        match self {
            AttemptError::Network { code, message } => {
                *code == ErrorCode::ConnectionAborted || message.contains("timeout")
            }
            AttemptError::Other { message } => message.contains("timeout"),
            AttemptError::Status { .. } | AttemptError::CircuitOpen { .. } => false,
        }
    }
}

/// The main error type for Cutline client operations outside a request.
#[derive(Error, Debug)]
pub enum CutlineError {
    /// A URL could not be parsed or joined
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Reason for invalidity
        reason: String,
    },

    /// A configuration value violates its invariant
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The transport could not be constructed
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    /// A request failed after the retry loop gave up
    #[error(transparent)]
    Attempt(#[from] AttemptError),

    /// Wrapped error from external source
    #[error("External error: {message}")]
    External {
        /// Error message
        message: String,
    },
}

impl CutlineError {
    /// Returns the attempt failure, if this error wraps one
    pub fn attempt(&self) -> Option<&AttemptError> {
        match self {
            CutlineError::Attempt(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if a circuit breaker rejected the request
    pub fn is_circuit_open(&self) -> bool {
        self.attempt().is_some_and(AttemptError::is_circuit_open)
    }
}

/// Convenient Result type using CutlineError
pub type Result<T> = std::result::Result<T, CutlineError>;

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Adds context to an error
    fn context(self, ctx: impl Into<String>) -> Result<T>;

    /// Adds context using a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| CutlineError::External {
            message: format!("{}: {}", ctx.into(), e),
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| CutlineError::External {
            message: format!("{}: {}", f(), e),
        })
    }
}
