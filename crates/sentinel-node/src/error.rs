//! Error types for the Sentinel node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the node from starting.
#[derive(Debug, Error)]
pub enum Error {
    /// An environment variable held an unusable value.
    #[error("Config error: {0}")]
    Config(String),

    /// The feed file is structurally valid JSON but describes nothing usable.
    #[error("Feed error: {0}")]
    Feed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validator rejected its configuration or sources.
    #[error("Validator error: {0}")]
    Validator(#[from] sentinel_validator::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
