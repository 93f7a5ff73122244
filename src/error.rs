//! Error types for the Alita relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transcript identity could not be derived or is not filesystem-safe
    #[error("invalid user key: {0}")]
    InvalidUserKey(String),

    /// Transport (chat platform) error
    #[error("transport error: {0}")]
    Transport(String),

    /// Generative backend error
    #[error("generation error: {0}")]
    Generation(String),

    /// Backend did not finish streaming in time
    #[error("generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Media persistence error
    #[error("media error: {0}")]
    Media(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
