//! SQLite dialect and provider entry point.

use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use sqlgrid_core::convert::{format_date_time, parse_date_time};
use sqlgrid_core::error::{GridError, Result};
use sqlgrid_core::provider::{DatabasePool, DatabaseProvider, Dialect};
use sqlgrid_core::schema::{Column, ValueType};
use sqlgrid_core::value::SqlValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::pool::SqliteDatabase;

/// Provider name used in connection strings.
pub const PROVIDER_NAME: &str = "sqlite";

const RESERVED_WORDS: &[&str] = &[
    "ABORT", "ADD", "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK",
    "COLLATE", "COLUMN", "COMMIT", "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC",
    "DISTINCT", "DROP", "ELSE", "END", "ESCAPE", "EXCEPT", "EXISTS", "FOREIGN", "FROM", "FULL",
    "GLOB", "GROUP", "HAVING", "IN", "INDEX", "INNER", "INSERT", "INTERSECT", "INTO", "IS",
    "ISNULL", "JOIN", "KEY", "LEFT", "LIKE", "LIMIT", "MATCH", "NATURAL", "NOT", "NOTNULL",
    "NULL", "OF", "OFFSET", "ON", "OR", "ORDER", "OUTER", "PRIMARY", "REFERENCES", "REGEXP",
    "RIGHT", "ROLLBACK", "ROW", "SELECT", "SET", "TABLE", "THEN", "TO", "TRANSACTION", "UNION",
    "UNIQUE", "UPDATE", "USING", "VALUES", "VIEW", "WHEN", "WHERE", "WITH",
];

/// SQLite provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

impl SqliteProvider {
    /// Creates the provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Extracts `n` from a declared type such as `VARCHAR(50)`.
pub(crate) fn declared_length(type_name: &str) -> u32 {
    type_name
        .split_once('(')
        .and_then(|(_, rest)| rest.split([',', ')']).next())
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0)
}

/// Parses either a `sqlx` URL or `Data Source=<file>` pairs. Returns the
/// options and whether the database lives in memory.
pub(crate) fn connect_options(connection_string: &str) -> Result<(SqliteConnectOptions, bool)> {
    let trimmed = connection_string.trim();
    if trimmed.starts_with("sqlite:") {
        let options = SqliteConnectOptions::from_str(trimmed)
            .map_err(|e| GridError::InvalidConnectionString(e.to_string()))?;
        return Ok((options, trimmed.contains(":memory:")));
    }

    let source = trimmed
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| {
            let key = key.trim();
            key.eq_ignore_ascii_case("data source")
                || key.eq_ignore_ascii_case("datasource")
                || key.eq_ignore_ascii_case("filename")
        })
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| GridError::InvalidConnectionString(connection_string.to_string()))?;

    if source == ":memory:" {
        return Ok((SqliteConnectOptions::new().in_memory(true), true));
    }
    Ok((
        SqliteConnectOptions::new()
            .filename(source)
            .create_if_missing(true),
        false,
    ))
}

impl Dialect for SqliteProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn parameter_prefix(&self) -> &'static str {
        "?"
    }

    fn is_reserved_word(&self, word: &str) -> bool {
        RESERVED_WORDS
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(word))
    }

    /// Applies SQLite's affinity rules to a declared type.
    fn value_type_of(&self, type_name: &str) -> Option<ValueType> {
        let upper = type_name.to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or_default().trim();
        let value_type = match base {
            "" => return None,
            b if b.contains("BOOL") => ValueType::Boolean,
            "DATETIME" | "TIMESTAMP" => ValueType::DateTime,
            "DATE" => ValueType::Date,
            "TIME" => ValueType::Time,
            "UUID" | "GUID" | "UNIQUEIDENTIFIER" => ValueType::Uuid,
            "JSON" => ValueType::Json,
            "SMALLINT" | "TINYINT" => ValueType::SmallInt,
            "BIGINT" => ValueType::BigInt,
            b if b.contains("INT") => ValueType::Integer,
            b if b.contains("CHAR") || b.contains("CLOB") || b.contains("TEXT") => ValueType::Text,
            b if b.contains("BLOB") => ValueType::Binary,
            b if b.contains("REAL") || b.contains("FLOA") || b.contains("DOUB") => {
                ValueType::Double
            }
            b if b.contains("NUMERIC") || b.contains("DECIMAL") => ValueType::Decimal,
            _ => return None,
        };
        Some(value_type)
    }

    fn column_type_sql(&self, column: &Column) -> String {
        let Some(value_type) = column.value_type else {
            return if column.type_name.is_empty() {
                String::from("TEXT")
            } else {
                column.type_name.clone()
            };
        };
        match value_type {
            ValueType::Boolean => String::from("BOOLEAN"),
            ValueType::SmallInt | ValueType::Integer | ValueType::BigInt => String::from("INTEGER"),
            ValueType::Decimal => String::from("NUMERIC"),
            ValueType::Double => String::from("REAL"),
            ValueType::Text if column.max_length > 0 => format!("VARCHAR({})", column.max_length),
            ValueType::Text => String::from("TEXT"),
            ValueType::Date => String::from("DATE"),
            ValueType::DateTime => String::from("DATETIME"),
            ValueType::Time => String::from("TIME"),
            ValueType::Uuid => String::from("UUID"),
            ValueType::Binary => String::from("BLOB"),
            ValueType::Json => String::from("JSON"),
        }
    }

    /// SQLite keeps dates and booleans in generic storage classes; restore
    /// them from the column type before handing values to clients.
    fn convert_from_storage(&self, value: SqlValue, value_type: Option<ValueType>) -> Value {
        let value = match (value_type, value) {
            (Some(ValueType::Date | ValueType::DateTime), SqlValue::Text(text)) => {
                match parse_date_time(&text) {
                    Some(parsed) => SqlValue::Text(format_date_time(&parsed)),
                    None => SqlValue::Text(text),
                }
            }
            (Some(ValueType::Boolean), SqlValue::Int(i)) => SqlValue::Bool(i != 0),
            (Some(ValueType::Json), SqlValue::Text(text)) => serde_json::from_str(&text)
                .map_or(SqlValue::Text(text), SqlValue::Json),
            (_, value) => value,
        };
        sqlgrid_core::convert::sql_to_json(value)
    }
}

impl DatabaseProvider for SqliteProvider {
    fn dialect(&self) -> &dyn Dialect {
        self
    }

    fn connect<'a>(
        &'a self,
        connection_string: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn DatabasePool>>> {
        Box::pin(async move {
            let (options, in_memory) = connect_options(connection_string)?;
            // Every connection to `:memory:` is a separate database, so an
            // in-memory pool keeps exactly one connection alive.
            let pool_options = if in_memory {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
            } else {
                SqlitePoolOptions::new().max_connections(5)
            };
            let pool = pool_options
                .connect_with(options)
                .await
                .map_err(GridError::database)?;
            info!(provider = PROVIDER_NAME, in_memory, "Opened connection pool");
            Ok(Arc::new(SqliteDatabase::new(pool)) as Arc<dyn DatabasePool>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_mapping() {
        let p = SqliteProvider;
        assert_eq!(p.value_type_of("INTEGER"), Some(ValueType::Integer));
        assert_eq!(p.value_type_of("varchar(50)"), Some(ValueType::Text));
        assert_eq!(p.value_type_of("DATETIME"), Some(ValueType::DateTime));
        assert_eq!(p.value_type_of("decimal(10,2)"), Some(ValueType::Decimal));
        assert_eq!(p.value_type_of("BOOLEAN"), Some(ValueType::Boolean));
        assert_eq!(p.value_type_of("double precision"), Some(ValueType::Double));
        assert_eq!(p.value_type_of(""), None);
        assert_eq!(p.value_type_of("GEOMETRY"), None);
    }

    #[test]
    fn test_declared_length() {
        assert_eq!(declared_length("VARCHAR(50)"), 50);
        assert_eq!(declared_length("DECIMAL(10, 2)"), 10);
        assert_eq!(declared_length("TEXT"), 0);
    }

    #[test]
    fn test_quoting() {
        let p = SqliteProvider;
        assert_eq!(p.safe_column_name("name"), "name");
        assert_eq!(p.safe_column_name("group"), "\"group\"");
        assert_eq!(p.safe_column_name("Unit Price"), "\"Unit Price\"");
        assert_eq!(p.placeholder(0), "?1");
    }

    #[test]
    fn test_column_type_sql() {
        let p = SqliteProvider;
        let name = Column::new("S", "NAME", ValueType::Text).max_length(100);
        assert_eq!(p.column_type_sql(&name), "VARCHAR(100)");
        let id = Column::new("S", "ID", ValueType::BigInt);
        assert_eq!(p.column_type_sql(&id), "INTEGER");
    }

    #[test]
    fn test_convert_from_storage() {
        let p = SqliteProvider;
        assert_eq!(
            p.convert_from_storage(SqlValue::Text("2024-03-05".into()), Some(ValueType::Date)),
            Value::String("05.03.2024".into())
        );
        assert_eq!(
            p.convert_from_storage(
                SqlValue::Text("2024-03-05 10:20:30".into()),
                Some(ValueType::DateTime)
            ),
            Value::String("05.03.2024 10:20:30".into())
        );
        assert_eq!(
            p.convert_from_storage(SqlValue::Int(1), Some(ValueType::Boolean)),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_connect_options() {
        assert!(connect_options("Data Source=:memory:").unwrap().1);
        assert!(connect_options("sqlite::memory:").unwrap().1);
        assert!(!connect_options("Data Source=app.db;Cache=Shared").unwrap().1);
        assert!(matches!(
            connect_options("Cache=Shared"),
            Err(GridError::InvalidConnectionString(_))
        ));
    }
}
