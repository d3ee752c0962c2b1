//! Error types for the capture engine.

use thiserror::Error;

use rowstream_connectors::ConnectorError;
use rowstream_core::CoreError;

/// Errors surfaced through the [`TaskManager`](crate::TaskManager) facade.
///
/// Connector failures observed by the scheduler never appear here — they are
/// recorded into the owning task's `last_error` and metrics instead, so one
/// task's failure can never halt another.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A task with this id already exists.
    #[error("task '{0}' already exists")]
    DuplicateTask(String),

    /// No task with this id is registered.
    #[error("task '{0}' not found")]
    TaskNotFound(String),

    /// The supplied source configuration failed validation.
    #[error("invalid task configuration: {0}")]
    Config(#[from] CoreError),

    /// A connector could not be constructed for the configuration.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
