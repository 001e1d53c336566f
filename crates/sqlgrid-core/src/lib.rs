//! # sqlgrid-core
//!
//! Engine-independent building blocks for editing arbitrary SQL result sets.
//!
//! This crate provides:
//!
//! - A shallow, quote- and parenthesis-aware statement segmenter
//! - A schema-driven resolver that decides which projected columns of a
//!   `SELECT` can be written back to a single base table
//! - A synthesizer that turns row-state diffs into parameterized
//!   `INSERT`/`UPDATE`/`DELETE` statements
//! - The provider traits every database engine implements
//!
//! ## Save resolution
//!
//! ```rust
//! use sqlgrid_core::resolve::SelectResolution;
//! use sqlgrid_core::schema::{Column, SchemaSnapshot, Table, ValueType};
//!
//! let schema = SchemaSnapshot::builder()
//!     .table(Table::new("T").primary_key("id"))
//!     .column(Column::new("T", "id", ValueType::Integer))
//!     .column(Column::new("T", "name", ValueType::Text))
//!     .build();
//!
//! let resolution = SelectResolution::resolve(Some(&schema), "SELECT id, name FROM T");
//! assert!(resolution.can_save());
//! assert_eq!(resolution.column_keys()[0].column_name, "id");
//! assert_eq!(resolution.column_saves()[0].column_name, "name");
//! ```

pub mod convert;
pub mod error;
pub mod format;
pub mod param;
pub mod provider;
pub mod resolve;
pub mod row;
pub mod schema;
pub mod segment;
pub mod span;
pub mod synth;
pub mod value;

pub use error::{GridError, Result};
pub use provider::{DatabasePool, DatabaseProvider, DatabaseSession, Dialect, ResultSet};
pub use resolve::{ColumnProjection, SelectResolution, TableReference};
pub use row::{Row, RowState};
pub use schema::{Column, Relation, SchemaSnapshot, Table, ValueType};
pub use segment::{RawStatement, ScriptType, SelectSegments};
pub use span::Span;
pub use synth::{BoundParameter, SynthesizedStatement};
pub use value::SqlValue;
