//! Statement nodes.

use super::Expr;
use crate::lexer::Span;

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let name = value;`
    Let {
        name: String,
        value: Expr,
        span: Span,
    },
    /// `name = value;`
    Assign {
        name: String,
        value: Expr,
        span: Span,
    },
    /// `[Caption] = value;`
    FieldAssign {
        caption: String,
        value: Expr,
        span: Span,
    },
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Block {
        body: Vec<Stmt>,
        span: Span,
    },
    Expr {
        expr: Expr,
        span: Span,
    },
}

impl Stmt {
    /// Returns the source location of this statement.
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::Let { span, .. }
            | Self::Assign { span, .. }
            | Self::FieldAssign { span, .. }
            | Self::If { span, .. }
            | Self::Return { span, .. }
            | Self::Block { span, .. }
            | Self::Expr { span, .. } => *span,
        }
    }
}

/// A parsed script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Top-level statements in source order.
    pub statements: Vec<Stmt>,
}

impl Program {
    /// Returns true when the script ends in a bare expression, whose value
    /// becomes the result if no `return` is reached.
    #[must_use]
    pub fn ends_with_expression(&self) -> bool {
        matches!(self.statements.last(), Some(Stmt::Expr { .. }))
    }
}
