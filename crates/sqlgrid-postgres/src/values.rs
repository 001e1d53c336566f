//! Binding parameters and decoding rows.
//!
//! Parameters are bound with their native PostgreSQL types. NULL is the
//! exception: it is sent without a type so the server infers one from the
//! surrounding expression.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlgrid_core::error::{GridError, Result};
use sqlgrid_core::synth::BoundParameter;
use sqlgrid_core::value::SqlValue;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgRow, PgTypeInfo, Postgres};
use sqlx::query::Query;
use sqlx::{Encode, Row, Type, TypeInfo, ValueRef};
use uuid::Uuid;

/// A NULL parameter with the unspecified type OID.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> std::result::Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Binds every parameter in order.
pub fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [BoundParameter],
) -> Result<Query<'q, Postgres, PgArguments>> {
    for param in params {
        query = match &param.value {
            SqlValue::Null => query.bind(UntypedNull),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Decimal(d) => query.bind(
                Decimal::from_str(d)
                    .or_else(|_| Decimal::from_scientific(d))
                    .map_err(|_| GridError::conversion(d, "numeric"))?,
            ),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Date(d) => query.bind(*d),
            SqlValue::DateTime(dt) => query.bind(*dt),
            SqlValue::Time(t) => query.bind(*t),
            SqlValue::Uuid(u) => query.bind(*u),
            SqlValue::Blob(bytes) => query.bind(bytes.as_slice()),
            SqlValue::Json(v) => query.bind(sqlx::types::Json(v)),
        };
    }
    Ok(query)
}

/// Decodes a row by the declared type of each column.
pub fn decode_row(row: &PgRow) -> Result<Vec<SqlValue>> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<T, _>(index).map_err(GridError::database)
}

fn decode_value(row: &PgRow, index: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(index).map_err(GridError::database)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => SqlValue::Bool(get(row, index)?),
        "INT2" => SqlValue::Int(get::<i16>(row, index)?.into()),
        "INT4" => SqlValue::Int(get::<i32>(row, index)?.into()),
        "INT8" => SqlValue::Int(get(row, index)?),
        "FLOAT4" => SqlValue::Float(get::<f32>(row, index)?.into()),
        "FLOAT8" => SqlValue::Float(get(row, index)?),
        "NUMERIC" => SqlValue::Decimal(get::<Decimal>(row, index)?.normalize().to_string()),
        "DATE" => SqlValue::Date(get::<NaiveDate>(row, index)?),
        "TIMESTAMP" => SqlValue::DateTime(get::<NaiveDateTime>(row, index)?),
        "TIMESTAMPTZ" => SqlValue::DateTime(get::<DateTime<Utc>>(row, index)?.naive_utc()),
        "TIME" => SqlValue::Time(get::<NaiveTime>(row, index)?),
        "UUID" => SqlValue::Uuid(get::<Uuid>(row, index)?),
        "BYTEA" => SqlValue::Blob(get(row, index)?),
        "JSON" | "JSONB" => SqlValue::Json(get::<sqlx::types::Json<serde_json::Value>>(row, index)?.0),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
            SqlValue::Text(get(row, index)?)
        }
        // Types without a client mapping are shown by name rather than
        // failing the whole result.
        other => SqlValue::Text(format!("<{}>", other.to_lowercase())),
    };
    Ok(value)
}
