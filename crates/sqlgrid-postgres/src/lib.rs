//! # sqlgrid-postgres
//!
//! PostgreSQL implementation of the sqlgrid provider traits, built on `sqlx`.
//!
//! - Catalog: `information_schema.tables`/`columns` of the current schema,
//!   `pg_index` for declared and unique keys, `pg_constraint` for foreign
//!   keys
//! - Placeholders: `$1`, `$2`, ...
//! - Identifiers containing upper-case letters are quoted, since unquoted
//!   names fold to lower case
//!
//! Connection strings are either `postgres://` URLs or
//! `Host=...;Port=...;Database=...;Username=...;Password=...` pairs.

mod dialect;
mod introspect;
mod pool;
mod values;

pub use dialect::PostgresProvider;
pub use pool::{PostgresDatabase, PostgresSession};
