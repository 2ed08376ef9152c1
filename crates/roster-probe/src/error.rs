//! Error types for outbound calls made by the refresh pipeline.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single outbound HTTP call.
///
/// These never abort a refresh cycle on their own: the caller degrades
/// the affected field and records the error for logging.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("malformed body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected payload: {0}")]
    Payload(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e)
        } else {
            FetchError::Transport(e)
        }
    }
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

/// Failure to assemble the refresh pipeline.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid instance line pattern: {0}")]
    Pattern(#[from] regex::Error),
}
