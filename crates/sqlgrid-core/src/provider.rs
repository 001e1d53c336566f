//! Provider abstraction: what each database engine must supply.
//!
//! The core crate only defines the traits so it stays driver-agnostic.
//! Engine crates (sqlgrid-sqlite, sqlgrid-postgres) implement them on top
//! of their driver.
//!
//! The async traits return boxed futures so they stay object safe; the
//! service layer holds providers as `Arc<dyn DatabaseProvider>`.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::convert;
use crate::error::Result;
use crate::schema::{Column, Relation, Table, ValueType};
use crate::synth::SynthesizedStatement;
use crate::value::SqlValue;

/// Engine-specific SQL text and value rules.
pub trait Dialect: Send + Sync {
    /// Returns the provider name used in connection strings.
    fn name(&self) -> &'static str;

    /// Marker that precedes the 1-based parameter number (`?`, `$`).
    fn parameter_prefix(&self) -> &'static str;

    /// Placeholder for the zero-based parameter `index`.
    fn placeholder(&self, index: usize) -> String {
        format!("{}{}", self.parameter_prefix(), index + 1)
    }

    /// Returns the identifier quote character.
    fn identifier_quote(&self) -> char {
        '"'
    }

    /// Returns true for words the engine reserves.
    fn is_reserved_word(&self, word: &str) -> bool;

    /// Returns true if `name` must be quoted to be used as an identifier.
    ///
    /// The default quotes names containing whitespace and reserved words.
    fn needs_quoting(&self, name: &str) -> bool {
        name.chars().any(char::is_whitespace) || self.is_reserved_word(name)
    }

    /// Returns `name` quoted when necessary. Already quoted names pass through.
    fn safe_column_name(&self, name: &str) -> String {
        let quote = self.identifier_quote();
        if name.len() > 1 && name.starts_with(quote) && name.ends_with(quote) {
            return name.to_string();
        }
        if self.needs_quoting(name) {
            let escaped = name.replace(quote, &format!("{quote}{quote}"));
            format!("{quote}{escaped}{quote}")
        } else {
            name.to_string()
        }
    }

    /// Maps an engine type name to the abstract value type.
    fn value_type_of(&self, type_name: &str) -> Option<ValueType>;

    /// Engine column type for a column definition, length included.
    fn column_type_sql(&self, column: &Column) -> String;

    /// Converts a client value into a bindable storage value.
    fn convert_to_storage(&self, value: &Value, value_type: Option<ValueType>) -> Result<SqlValue> {
        convert::json_to_sql(value, value_type)
    }

    /// Converts a decoded storage value into its client representation.
    fn convert_from_storage(&self, value: SqlValue, value_type: Option<ValueType>) -> Value {
        let _ = value_type;
        convert::sql_to_json(value)
    }

    /// `CREATE TABLE` text for the given columns.
    fn create_table_sql(&self, table_name: &str, columns: &[Column]) -> String {
        let definitions: Vec<String> = columns
            .iter()
            .map(|column| {
                let mut definition = format!(
                    "{} {}",
                    self.safe_column_name(&column.column_name),
                    self.column_type_sql(column)
                );
                if !column.is_nullable {
                    definition.push_str(" NOT NULL");
                }
                definition
            })
            .collect();
        format!(
            "CREATE TABLE {} ({})",
            self.safe_column_name(table_name),
            definitions.join(", ")
        )
    }
}

/// A database engine: a dialect that can open connection pools.
pub trait DatabaseProvider: Dialect {
    /// Returns the provider as a plain dialect.
    fn dialect(&self) -> &dyn Dialect;

    /// Opens a pool for the provider-specific connection string.
    fn connect<'a>(&'a self, connection_string: &'a str)
        -> BoxFuture<'a, Result<Arc<dyn DatabasePool>>>;
}

/// An open connection pool to one database.
pub trait DatabasePool: Send + Sync {
    /// Starts a transaction on a dedicated connection.
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn DatabaseSession>>>;

    /// Lists tables and views with their resolved primary-key column.
    fn tables(&self) -> BoxFuture<'_, Result<Vec<Table>>>;

    /// Lists the columns of all tables and views.
    fn columns(&self) -> BoxFuture<'_, Result<Vec<Column>>>;

    /// Lists foreign-key edges.
    fn relations(&self) -> BoxFuture<'_, Result<Vec<Relation>>>;

    /// Creates a table unless it already exists. Returns true if created.
    fn create_table_if_not_exists<'a>(
        &'a self,
        table_name: &'a str,
        columns: &'a [Column],
    ) -> BoxFuture<'a, Result<bool>>;

    /// Closes all connections.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// One transaction on one connection.
///
/// Dropping a session without commit rolls it back.
pub trait DatabaseSession: Send {
    /// Runs a row-returning statement, reading at most `max_rows + 1` rows.
    ///
    /// `has_more_rows` reports whether the extra row was present.
    fn query<'a>(
        &'a mut self,
        statement: &'a SynthesizedStatement,
        max_rows: Option<usize>,
    ) -> BoxFuture<'a, Result<ResultSet>>;

    /// Runs a statement and returns the affected row count.
    fn execute<'a>(&'a mut self, statement: &'a SynthesizedStatement)
        -> BoxFuture<'a, Result<u64>>;

    /// Commits the transaction.
    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>>;

    /// Rolls the transaction back.
    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Name and engine type of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    /// Column label.
    pub name: String,
    /// Engine type name.
    pub type_name: String,
}

/// Rows returned by [`DatabaseSession::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Result shape.
    pub columns: Vec<ResultColumn>,
    /// Decoded rows, one value per column.
    pub rows: Vec<Vec<SqlValue>>,
    /// True when more rows were available than requested.
    pub has_more_rows: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestDialect;

    impl Dialect for TestDialect {
        fn name(&self) -> &'static str {
            "test"
        }

        fn parameter_prefix(&self) -> &'static str {
            "$"
        }

        fn is_reserved_word(&self, word: &str) -> bool {
            word.eq_ignore_ascii_case("order")
        }

        fn value_type_of(&self, _type_name: &str) -> Option<ValueType> {
            None
        }

        fn column_type_sql(&self, column: &Column) -> String {
            if column.max_length > 0 {
                format!("VARCHAR({})", column.max_length)
            } else {
                String::from("INTEGER")
            }
        }
    }

    #[test]
    fn test_placeholder_is_one_based() {
        assert_eq!(TestDialect.placeholder(0), "$1");
        assert_eq!(TestDialect.placeholder(4), "$5");
    }

    #[test]
    fn test_safe_column_name() {
        assert_eq!(TestDialect.safe_column_name("name"), "name");
        assert_eq!(TestDialect.safe_column_name("first name"), "\"first name\"");
        assert_eq!(TestDialect.safe_column_name("Order"), "\"Order\"");
        assert_eq!(TestDialect.safe_column_name("\"x y\""), "\"x y\"");
    }

    #[test]
    fn test_create_table_sql() {
        let columns = [
            Column::new("S", "ID", ValueType::Integer).not_null(),
            Column::new("S", "order", ValueType::Text).max_length(50),
        ];
        assert_eq!(
            TestDialect.create_table_sql("S", &columns),
            "CREATE TABLE S (ID INTEGER NOT NULL, \"order\" VARCHAR(50))"
        );
    }
}
