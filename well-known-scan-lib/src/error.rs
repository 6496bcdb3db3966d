//! Error handling for scan operations.
//!
//! This module defines the error type that covers every way a scan can fail,
//! from transient network issues to unreadable candidate lists. Most variants
//! never escape a single key: the probe retries or degrades them, and the
//! worker pool isolates the rest. Only resource exhaustion and startup
//! failures reach the caller.

use std::time::Duration;
use thiserror::Error;

/// Main error type for scan operations.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// Transport-level failure (connection refused, reset, DNS, TLS, ...)
    #[error("Network error: {message}{}", .detail.as_ref().map(|d| format!(" (source: {})", d)).unwrap_or_default())]
    Network {
        message: String,
        detail: Option<String>,
    },

    /// A single attempt exceeded its wall-clock budget
    #[error("Timeout after {duration:?} during: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Server answered with a status worth retrying (5xx, 429)
    #[error("HTTP {status} from '{key}'")]
    HttpStatus { key: String, status: u16 },

    /// The process ran out of file descriptors or memory
    #[error("Resource exhausted: {message}")]
    ResourceExhausted { message: String },

    /// Candidate key failed basic validation
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Candidate list could not be read
    #[error("Input error at '{path}': {message}")]
    Input { path: String, message: String },

    /// Configuration errors (invalid settings, unparsable files, etc.)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Result or cache store could not be serialized or written
    #[error("Persistence error at '{path}': {message}")]
    Persistence { path: String, message: String },

    /// Unexpected failure that doesn't fit other categories
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ScanError {
    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::Network {
            message: message.into(),
            detail: None,
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::Network {
            message: message.into(),
            detail: Some(source.into()),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn http_status<K: Into<String>>(key: K, status: u16) -> Self {
        Self::HttpStatus {
            key: key.into(),
            status,
        }
    }

    pub fn resource_exhausted<M: Into<String>>(message: M) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
        }
    }

    pub fn invalid_key<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn input<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::Input {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn persistence<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error suggests the request should be retried.
    ///
    /// Validation failures never land here: they are classified as
    /// `NotFound` before an error is ever built.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// Whether this error must stop the whole run instead of being
    /// isolated to the key that raised it.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}

/// Walk an error's source chain looking for descriptor or memory exhaustion.
pub(crate) fn find_exhaustion(err: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if is_exhaustion_io(io) {
                return Some(io.to_string());
            }
        }
        current = e.source();
    }
    None
}

fn is_exhaustion_io(err: &std::io::Error) -> bool {
    is_descriptor_exhaustion(err) || err.kind() == std::io::ErrorKind::OutOfMemory
}

/// ENFILE / EMFILE
#[cfg(unix)]
fn is_descriptor_exhaustion(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(23) | Some(24))
}

#[cfg(not(unix))]
fn is_descriptor_exhaustion(_err: &std::io::Error) -> bool {
    false
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(message) = find_exhaustion(&err) {
            Self::resource_exhausted(message)
        } else if err.is_timeout() {
            Self::timeout("HTTP request", Duration::from_secs(0))
        } else if err.is_connect() {
            Self::network_with_source("Connection failed", err.to_string())
        } else if let Some(status) = err.status() {
            Self::network_with_source(format!("HTTP {}", status.as_u16()), err.to_string())
        } else {
            Self::network_with_source("HTTP request failed", err.to_string())
        }
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        if is_exhaustion_io(&err) {
            Self::resource_exhausted(err.to_string())
        } else {
            Self::internal(format!("I/O error: {}", err))
        }
    }
}

impl From<csv::Error> for ScanError {
    fn from(err: csv::Error) -> Self {
        Self::input("<csv>", err.to_string())
    }
}
