//! Error types for wootrico-channels

use thiserror::Error;

/// Gateway client error type
#[derive(Debug, Error)]
pub enum Error {
    /// Network or timeout error
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response from the gateway
    #[error("gateway returned {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, truncated for logging
        body: String,
    },

    /// Payload shape error
    #[error("payload error: {0}")]
    Payload(String),

    /// A dialect that requires a recipient was not given one
    #[error("recipient is required for this operation")]
    MissingRecipient,

    /// Media could not be fetched or decoded
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
