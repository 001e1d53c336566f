//! Binding parameters and decoding rows.

use sqlgrid_core::error::{GridError, Result};
use sqlgrid_core::synth::BoundParameter;
use sqlgrid_core::value::SqlValue;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::query::Query;
use sqlx::{Row, TypeInfo, ValueRef};

/// Binds every parameter in order. UUIDs and JSON documents are stored as
/// text, decimals as their canonical text.
pub fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [BoundParameter],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match &param.value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Decimal(d) | SqlValue::Text(d) => query.bind(d.as_str()),
            SqlValue::Date(d) => query.bind(*d),
            SqlValue::DateTime(dt) => query.bind(*dt),
            SqlValue::Time(t) => query.bind(*t),
            SqlValue::Uuid(u) => query.bind(u.hyphenated().to_string()),
            SqlValue::Blob(bytes) => query.bind(bytes.as_slice()),
            SqlValue::Json(v) => query.bind(v.to_string()),
        };
    }
    query
}

/// Decodes a row by the storage class of each value.
pub fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(index).map_err(GridError::database)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => SqlValue::Int(
            row.try_get_unchecked::<i64, _>(index)
                .map_err(GridError::database)?,
        ),
        "REAL" => SqlValue::Float(
            row.try_get_unchecked::<f64, _>(index)
                .map_err(GridError::database)?,
        ),
        "BLOB" => SqlValue::Blob(
            row.try_get_unchecked::<Vec<u8>, _>(index)
                .map_err(GridError::database)?,
        ),
        _ => SqlValue::Text(
            row.try_get_unchecked::<String, _>(index)
                .map_err(GridError::database)?,
        ),
    };
    Ok(value)
}
