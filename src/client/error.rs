//! Client error types.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`HttpClient`](super::HttpClient).
///
/// Transport failures are passed through untouched; the instrumentation adds
/// no error cases of its own.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The target URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The round trip exceeded the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The pooled transport could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else {
            Self::Transport(err)
        }
    }
}

/// Invalid client configuration, rejected when the configuration is built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid timeout {0}s: must be a finite, non-negative number of seconds")]
    InvalidTimeout(f64),

    #[error("timeout {0:?} exceeds the maximum of {1:?}")]
    TimeoutTooLarge(Duration, Duration),
}
