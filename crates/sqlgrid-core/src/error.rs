//! Error types shared by the resolver, synthesizer and providers.

/// Errors raised while binding, synthesizing or executing statements.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// A script references a `<#caption#>` parameter with no matching column.
    #[error("Column {0} not present")]
    ParameterNotFound(String),

    /// An UPDATE or DELETE would run without any key predicate.
    #[error("Table '{0}' has no key column in the statement; refusing to update or delete without a WHERE clause")]
    MissingKeyPredicate(String),

    /// The statement has no save target.
    #[error("Statement cannot be saved: no single updatable table")]
    NotSaveable,

    /// The engine rejected a statement. Carries the offending SQL text.
    #[error("{message}\n\n{sql}")]
    Execution {
        /// Engine error message.
        message: String,
        /// The statement that failed.
        sql: String,
    },

    /// A row value could not be converted to the column's storage type.
    #[error("Cannot convert '{value}' to {target}")]
    Conversion {
        /// Rendered input value.
        value: String,
        /// Target type description.
        target: String,
    },

    /// The named provider is not registered.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// A connection string could not be parsed.
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// The session was already committed or rolled back.
    #[error("Session is no longer active")]
    SessionClosed,

    /// Driver error outside of statement execution (connect, begin, commit).
    #[error("Database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GridError {
    /// Wraps an engine error together with the statement that caused it.
    pub fn execution(error: impl std::fmt::Display, sql: impl Into<String>) -> Self {
        Self::Execution {
            message: error.to_string(),
            sql: sql.into(),
        }
    }

    /// Wraps a driver error.
    pub fn database(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Database(Box::new(error))
    }

    /// Builds a conversion error.
    pub fn conversion(value: impl std::fmt::Display, target: impl Into<String>) -> Self {
        Self::Conversion {
            value: value.to_string(),
            target: target.into(),
        }
    }
}

/// Result type for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;
