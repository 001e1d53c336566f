//! Parser error types.

use crate::lexer::{Span, TokenKind};

/// A parse error.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// The error message.
    pub message: String,
    /// The location of the error.
    pub span: Span,
}

impl ParseError {
    /// Creates a new parse error.
    #[must_use]
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// Creates an "unexpected token" error.
    #[must_use]
    pub fn unexpected(expected: &str, found: &TokenKind, span: Span) -> Self {
        let message = match found {
            TokenKind::Eof => format!("Unexpected end of script: expected {expected}"),
            TokenKind::Error(lexical) => lexical.clone(),
            other => format!("Unexpected token: expected {expected}, found {}", describe(other)),
        };
        Self { message, span }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Integer(n) => n.to_string(),
        TokenKind::Float(f) => f.to_string(),
        TokenKind::String(s) => format!("'{s}'"),
        TokenKind::Identifier(name) => name.clone(),
        TokenKind::Field(caption) => format!("[{caption}]"),
        other => format!("{other:?}"),
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at line {}", self.message, self.span.line)
    }
}

impl std::error::Error for ParseError {}
