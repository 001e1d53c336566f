//! # sqlgrid-sqlite
//!
//! SQLite implementation of the sqlgrid provider traits, built on `sqlx`.
//!
//! - Catalog: `sqlite_master` tables and views, `pragma_table_info` for
//!   columns and declared keys, `pragma_index_list`/`pragma_index_info` for
//!   the unique-index key fallback, `pragma_foreign_key_list` for relations
//! - Placeholders: `?1`, `?2`, ...
//! - Types: declared types are mapped by SQLite affinity rules; dates are
//!   stored as ISO text and returned in client format
//!
//! Connection strings are either `sqlx` URLs (`sqlite::memory:`,
//! `sqlite://data.db?mode=rwc`) or `Data Source=<file>` pairs.

mod dialect;
mod introspect;
mod pool;
mod values;

pub use dialect::SqliteProvider;
pub use pool::{SqliteDatabase, SqliteSession};
