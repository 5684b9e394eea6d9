//! Error types for wootrico-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing or malformed environment)
    #[error("configuration error: {0}")]
    Config(String),

    /// Payload shape error
    #[error("payload error: {0}")]
    Payload(String),

    /// Media download error
    #[error("media download error: {0}")]
    Download(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
