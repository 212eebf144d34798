//! Error types for the request engine.

use thiserror::Error;

/// Errors produced while sending a request.
///
/// Status failures deliberately carry only the final status code, never an
/// intermediate response body.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Transport-level failure (DNS, connect, TLS, read) after all retries.
    #[error("request to {url} failed after {attempts} attempts: {source}")]
    Transport {
        /// The URL that failed.
        url: String,
        /// Total attempts made before giving up.
        attempts: u32,
        /// The final underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-200 responses exhausted the retry budget with status checking on.
    #[error("request to {url} failed after {attempts} attempts, status code => {status}")]
    Status {
        /// The URL that failed.
        url: String,
        /// Total attempts made before giving up.
        attempts: u32,
        /// The last HTTP status observed.
        status: u16,
    },

    /// The URL could not be parsed.
    #[error("invalid request URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The request was cancelled via the batch cancellation token.
    ///
    /// Cancellation is a distinct outcome, not a failure; callers check
    /// [`RequestError::is_cancelled`] before treating a result as an error.
    #[error("request cancelled")]
    Cancelled,
}

impl RequestError {
    /// Creates a transport error.
    pub fn transport(url: impl Into<String>, attempts: u32, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            attempts,
            source,
        }
    }

    /// Creates a status error.
    pub fn status(url: impl Into<String>, attempts: u32, status: u16) -> Self {
        Self::Status {
            url: url.into(),
            attempts,
            status,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns `true` if this result represents cancellation rather than failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
