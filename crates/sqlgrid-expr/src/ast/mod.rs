//! Syntax tree for expression scripts.

mod expression;
mod statement;

pub use expression::{BinaryOp, Expr, Literal, UnaryOp};
pub use statement::{Program, Stmt};
