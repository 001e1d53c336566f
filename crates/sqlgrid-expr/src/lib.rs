//! # sqlgrid-expr
//!
//! A small scripting language for computed grid columns and change rules.
//!
//! Scripts are compiled once per distinct definition and cached by content
//! hash. A definition fixes the script kind, the imported function
//! modules, the parameters and the source text:
//!
//! ```rust
//! use sqlgrid_expr::{Argument, ScriptCache, ScriptDefinition, Value};
//!
//! let cache = ScriptCache::new();
//! let definition = ScriptDefinition::evaluate("let total = qty * 2;\nround(total / 3, 2)")
//!     .import("math")
//!     .parameter("qty", sqlgrid_expr::ParameterKind::Value);
//!
//! let script = cache.get_or_compile(&definition).unwrap();
//! let value = script.evaluate(&mut [Argument::Value(Value::Int(5))]).unwrap();
//! assert_eq!(value, Value::Float(3.33));
//!
//! // Same definition, no second compile.
//! cache.get_or_compile(&definition).unwrap();
//! assert_eq!(cache.compile_count(), 1);
//! ```
//!
//! ## Language
//!
//! - `let name = expr;` declares a variable, `name = expr;` reassigns it
//! - `if cond { ... } else { ... }` and `return expr;`
//! - `+ - * / %`, comparisons, `&&`/`and`, `||`/`or`, `!`/`not`
//! - `[Caption]` reads a field of the first row parameter and
//!   `[Caption] = expr;` writes it
//! - `row.value("Caption")` and `row.set("Caption", expr)` on any row
//!   parameter
//! - built-in functions, some of which need an import (`math`, `text`,
//!   `date`)
//!
//! A script that ends in a bare expression yields that value when no
//! `return` is reached first.

pub mod ast;
pub mod builtins;
mod cache;
mod check;
mod compiled;
pub mod diagnostic;
pub mod error;
mod interpreter;
pub mod lexer;
pub mod parser;
mod script;
mod value;

pub use cache::ScriptCache;
pub use compiled::CompiledScript;
pub use diagnostic::{Diagnostic, Severity};
pub use error::{Result, ScriptError};
pub use interpreter::{Argument, RowContext};
pub use script::{ParameterKind, ScriptDefinition, ScriptKind, ScriptParameter};
pub use value::Value;
