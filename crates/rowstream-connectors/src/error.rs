//! Error types for source connectors.

use thiserror::Error;

/// Errors that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source is unreachable or the connection pool is down.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The table has no usable natural cursor column. The capture engine
    /// marks such tables unsupported and keeps the task running.
    #[error("no natural cursor column found on table '{0}'")]
    NoCursorColumn(String),

    /// A statement failed against a live connection.
    #[error("Query error: {0}")]
    Query(String),
}

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

impl From<rowstream_core::CoreError> for ConnectorError {
    fn from(e: rowstream_core::CoreError) -> Self {
        ConnectorError::Config(e.to_string())
    }
}

impl From<sqlx::Error> for ConnectorError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => ConnectorError::Connection(e.to_string()),
            other => ConnectorError::Query(other.to_string()),
        }
    }
}
