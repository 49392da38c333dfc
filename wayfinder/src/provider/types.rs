//! Provider error taxonomy.

use thiserror::Error;

/// Errors from backend adapters.
///
/// Transient errors (rate-limit, server-busy) are retried by the
/// request scheduler; everything else surfaces immediately.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// The backend rate-limited the request.
    #[error("rate limited by backend")]
    RateLimited,

    /// The backend reported itself overloaded (HTTP 5xx class).
    #[error("backend busy: {0}")]
    ServerBusy(String),

    /// Transport-level failure or unexpected status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The response did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// True for the rate-limit / server-busy class the scheduler
    /// retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::ServerBusy(_))
    }
}
