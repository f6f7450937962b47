// Error types. Only AggregateError ever reaches a caller; SourceError stops at the adapter.

use thiserror::Error;

/// Failure of one aggregation cycle.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("diagram not found: {0}")]
    NotFound(String),
}

/// Failure inside one telemetry source. Folded into an empty result at the adapter boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited by backend")]
    RateLimited,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("missing configuration: {0}")]
    ConfigurationMissing(&'static str),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_connect() {
            SourceError::Connection(err.to_string())
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}
