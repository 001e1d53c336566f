//! Token definitions.

use super::Span;

/// Reserved words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Let,
    If,
    Else,
    Return,
    True,
    False,
    Null,
    And,
    Or,
    Not,
}

impl Keyword {
    /// Looks up a keyword, case-sensitively.
    #[must_use]
    pub fn from_str(text: &str) -> Option<Self> {
        Some(match text {
            "let" => Self::Let,
            "if" => Self::If,
            "else" => Self::Else,
            "return" => Self::Return,
            "true" => Self::True,
            "false" => Self::False,
            "null" => Self::Null,
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            _ => return None,
        })
    }
}

/// Kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// String literal, escapes resolved.
    String(String),
    /// Identifier.
    Identifier(String),
    /// `[Caption]` row field reference.
    Field(String),
    /// Reserved word.
    Keyword(Keyword),

    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
    Dot,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    /// `=`
    Assign,
    /// `==`
    Eq,
    /// `!=` or `<>`
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Bang,

    /// Lexical error with message.
    Error(String),
    /// End of input.
    Eof,
}

/// A token with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token kind.
    pub kind: TokenKind,
    /// Source location.
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns true at end of input.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
