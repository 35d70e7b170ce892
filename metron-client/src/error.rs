//! Client error types.

use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned by the metron client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The base URL is not usable.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// A timestamp response body had an unexpected length.
    #[error("malformed timestamp response: {0} bytes")]
    MalformedResponse(usize),
}
