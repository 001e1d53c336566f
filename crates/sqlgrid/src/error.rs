//! Error type of the service layer.

use thiserror::Error;

use sqlgrid_core::error::GridError;
use sqlgrid_expr::ScriptError;

/// Errors raised by the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Resolution, synthesis or database error.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// A change-data code rule failed to compile or run.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// No database is registered under this id.
    #[error("Unknown database: {0}")]
    UnknownDatabase(i32),

    /// The operation needs a `SELECT`.
    #[error("Statement is not a query")]
    NotAQuery,

    /// A statement exceeded the command timeout.
    #[error("Command timed out after {seconds}s\n\n{sql}")]
    Timeout {
        /// Configured timeout.
        seconds: u64,
        /// The statement that was running.
        sql: String,
    },

    /// The settings repository holds data it cannot read back.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
