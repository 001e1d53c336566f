//! Error types for compiling and running scripts.

use thiserror::Error;

use crate::diagnostic::{render, Diagnostic};
use crate::script::ScriptKind;

/// Errors raised by the expression engine.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Compilation produced at least one error. Carries every diagnostic,
    /// warnings included.
    #[error("{}", render(.0))]
    Compile(Vec<Diagnostic>),

    /// The script failed while running.
    #[error("Line {line}: {message}")]
    Runtime { line: u32, message: String },

    /// Argument count does not match the declared parameters.
    #[error("Script expects {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },

    /// A row was passed for a value parameter or the other way around.
    #[error("Argument '{0}' has the wrong kind")]
    ArgumentKind(String),

    /// Evaluate called on an execute script or the reverse.
    #[error("Script was compiled for {0:?}")]
    WrongKind(ScriptKind),
}

impl ScriptError {
    pub(crate) fn runtime(line: u32, message: impl Into<String>) -> Self {
        Self::Runtime {
            line,
            message: message.into(),
        }
    }

    /// Diagnostics of a compile failure, empty for other errors.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Compile(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}

/// Result type for script operations.
pub type Result<T> = std::result::Result<T, ScriptError>;
