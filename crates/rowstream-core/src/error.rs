//! Error types for the core crate.

use thiserror::Error;

/// Errors produced by core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid or incomplete source configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
