//! Error types for wootrico-helpdesk

use thiserror::Error;

/// Helpdesk client error type
#[derive(Debug, Error)]
pub enum Error {
    /// Network or timeout error
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response from the helpdesk
    #[error("helpdesk returned {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, truncated for logging
        body: String,
    },

    /// A response lacked a field the bridge depends on
    #[error("helpdesk response missing {0}")]
    MissingField(&'static str),

    /// Response body could not be parsed
    #[error("payload error: {0}")]
    Payload(String),

    /// Sidecar file I/O error
    #[error("sidecar file error: {0}")]
    Sidecar(String),

    /// Media bytes could not be obtained from any source
    #[error("media error: {0}")]
    Media(String),
}

impl Error {
    /// Whether a retry may succeed (timeouts, transport errors, 5xx, 429)
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
