//! Error types for dora-metrics.
//!
//! Errors are split by how the run reacts to them:
//!
//! - **Configuration** errors abort the run before any stage executes and map
//!   to exit code 2.
//! - **Retryable** transport errors (`RateLimited`, 429/5xx `Status`) are
//!   produced once the bounded retry budget is exhausted.
//! - Everything else (store, export I/O) is fatal and maps to exit code 1.
//!
//! Oracle and signal failures never reach the top level: the derivation stages
//! downgrade them to "no evidence" and log a warning.
//!
//! # Example
//!
//! ```rust
//! use dora_metrics::errors::DoraError;
//!
//! let err = DoraError::missing_config(["GH_TOKEN", "OWNER"]);
//! assert!(err.is_config());
//! assert_eq!(err.exit_code(), 2);
//! ```

use std::time::Duration;
use thiserror::Error;

/// Main error type for dora-metrics operations
#[derive(Debug, Error)]
pub enum DoraError {
    /// Required configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite store errors
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Transport-level HTTP failures (connect, TLS, body read)
    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },

    /// Non-success HTTP status after retries
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Rate limit that could not be waited out within the retry ceiling
    #[error("Rate limited by {url}; retry after {retry_after:?}")]
    RateLimited { url: String, retry_after: Duration },

    /// A payload or stored value could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML parse errors
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl DoraError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a configuration error naming every missing setting
    pub fn missing_config<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::Config(format!("missing required settings: {}", names.join(", ")))
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a transport error for a URL
    pub fn http(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            message: message.into(),
        }
    }

    /// True for configuration errors, which abort before any stage runs.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// True when the same request may succeed if attempted later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Http { .. } => true,
            Self::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_config() {
            2
        } else {
            1
        }
    }
}

impl From<std::convert::Infallible> for DoraError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Statuses the HTTP layer retries with backoff.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, DoraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_lists_every_name() {
        let err = DoraError::missing_config(["GH_TOKEN", "REPO"]);
        assert_eq!(
            err.to_string(),
            "Configuration error: missing required settings: GH_TOKEN, REPO"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(DoraError::config("x").exit_code(), 2);
        assert_eq!(DoraError::decode("x").exit_code(), 1);
    }

    #[test]
    fn test_retryable_classification() {
        let limited = DoraError::RateLimited {
            url: "u".into(),
            retry_after: Duration::from_secs(5),
        };
        assert!(limited.is_retryable());
        assert!(DoraError::Status {
            url: "u".into(),
            status: 503
        }
        .is_retryable());
        assert!(!DoraError::Status {
            url: "u".into(),
            status: 404
        }
        .is_retryable());
        assert!(!DoraError::config("x").is_retryable());
    }
}
