//! Compiler diagnostics.

use std::fmt;

/// Diagnostic severity. Errors fail compilation, warnings are kept on the
/// compiled script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    /// Single-letter tag used when rendering.
    #[must_use]
    pub const fn tag(self) -> char {
        match self {
            Self::Error => 'E',
            Self::Warning => 'W',
        }
    }
}

/// A message produced while compiling a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// 1-based source line.
    pub line: u32,
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn error(line: u32, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            line,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn warning(line: u32, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            line,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

/// Renders as `E, Line-No: 00003, message`.
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Line-No: {:05}, {}",
            self.severity.tag(),
            self.line,
            self.message
        )
    }
}

/// Joins diagnostics one per line.
#[must_use]
pub fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
