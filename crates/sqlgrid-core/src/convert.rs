//! JSON <-> storage value conversion shared by all providers.
//!
//! Dates travel to the client as `dd.mm.yyyy` or `dd.mm.yyyy HH:MM:SS`,
//! depending on whether a time component is present. Incoming text is
//! accepted in that form or in ISO-8601.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::error::{GridError, Result};
use crate::schema::ValueType;
use crate::value::SqlValue;

/// Client-facing date format.
pub const DATE_FORMAT: &str = "%d.%m.%Y";
/// Client-facing date-time format.
pub const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
/// Client-facing time format.
pub const TIME_FORMAT: &str = "%H:%M:%S";

const DATE_TIME_INPUTS: &[&str] = &[
    DATE_TIME_FORMAT,
    "%d.%m.%Y %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_INPUTS: &[&str] = &[DATE_FORMAT, "%Y-%m-%d"];

/// Parses a client date-time string.
///
/// Date-only input yields midnight.
#[must_use]
pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_TIME_INPUTS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_local()))
        .or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Parses a client date string. A time component is discarded.
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_INPUTS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_TIME_INPUTS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|dt| dt.date())
        })
}

/// Parses a time of day.
#[must_use]
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
}

/// Renders a date-time, dropping the time when it is midnight.
#[must_use]
pub fn format_date_time(value: &NaiveDateTime) -> String {
    if value.num_seconds_from_midnight() == 0 && value.nanosecond() == 0 {
        value.format(DATE_FORMAT).to_string()
    } else {
        value.format(DATE_TIME_FORMAT).to_string()
    }
}

fn conversion_error(value: &Value, target: ValueType) -> GridError {
    GridError::conversion(value, format!("{target:?}"))
}

/// Converts a client value to a bindable value.
///
/// `null` and the empty string both become NULL. Without a known type the
/// JSON shape decides.
pub fn json_to_sql(value: &Value, value_type: Option<ValueType>) -> Result<SqlValue> {
    match value {
        Value::Null => return Ok(SqlValue::Null),
        Value::String(s) if s.is_empty() => return Ok(SqlValue::Null),
        _ => {}
    }

    let Some(target) = value_type else {
        return Ok(infer(value));
    };

    let converted = match target {
        ValueType::Boolean => match value {
            Value::Bool(b) => Some(SqlValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(|f| SqlValue::Bool(f != 0.0)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Some(SqlValue::Bool(true)),
                "false" | "0" => Some(SqlValue::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        ValueType::SmallInt | ValueType::Integer | ValueType::BigInt => match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
        .map(SqlValue::Int),
        ValueType::Decimal => match value {
            Value::Number(n) => Some(SqlValue::Decimal(n.to_string())),
            Value::String(s) => {
                let s = s.trim().replace(',', ".");
                s.parse::<f64>().ok().map(|_| SqlValue::Decimal(s))
            }
            _ => None,
        },
        ValueType::Double => match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
            _ => None,
        }
        .map(SqlValue::Float),
        ValueType::Text => Some(SqlValue::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ValueType::Date => value.as_str().and_then(parse_date).map(SqlValue::Date),
        ValueType::DateTime => value
            .as_str()
            .and_then(parse_date_time)
            .map(SqlValue::DateTime),
        ValueType::Time => value.as_str().and_then(parse_time).map(SqlValue::Time),
        ValueType::Uuid => value
            .as_str()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(SqlValue::Uuid),
        ValueType::Binary => match value {
            Value::String(s) => Some(SqlValue::Blob(s.as_bytes().to_vec())),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(SqlValue::Blob),
            _ => None,
        },
        ValueType::Json => Some(SqlValue::Json(value.clone())),
    };

    converted.ok_or_else(|| conversion_error(value, target))
}

fn infer(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Number(n) => n
            .as_i64()
            .map_or_else(|| SqlValue::Float(n.as_f64().unwrap_or_default()), SqlValue::Int),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Json(value.clone()),
    }
}

/// Converts a decoded storage value to its client representation.
#[must_use]
pub fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(b),
        SqlValue::Int(n) => Value::from(n),
        SqlValue::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        SqlValue::Decimal(d) => d
            .parse::<i64>()
            .ok()
            .map(Value::from)
            .or_else(|| d.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number))
            .unwrap_or(Value::String(d)),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
        SqlValue::DateTime(dt) => Value::String(format_date_time(&dt)),
        SqlValue::Time(t) => Value::String(t.format(TIME_FORMAT).to_string()),
        SqlValue::Uuid(u) => Value::String(u.to_string()),
        SqlValue::Blob(bytes) => {
            Value::String(bytes.iter().map(|b| format!("{b:02x}")).collect())
        }
        SqlValue::Json(v) => v,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_null_and_empty_string_are_null() {
        assert_eq!(json_to_sql(&json!(null), Some(ValueType::Integer)).unwrap(), SqlValue::Null);
        assert_eq!(json_to_sql(&json!(""), Some(ValueType::Text)).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_integer_conversion() {
        assert_eq!(json_to_sql(&json!(5), Some(ValueType::Integer)).unwrap(), SqlValue::Int(5));
        assert_eq!(json_to_sql(&json!("42"), Some(ValueType::BigInt)).unwrap(), SqlValue::Int(42));
        assert_eq!(json_to_sql(&json!(3.0), Some(ValueType::SmallInt)).unwrap(), SqlValue::Int(3));
        assert!(matches!(
            json_to_sql(&json!("abc"), Some(ValueType::Integer)),
            Err(GridError::Conversion { .. })
        ));
    }

    #[test]
    fn test_date_round_trip_formats() {
        let value = json_to_sql(&json!("24.12.2023 18:30:00"), Some(ValueType::DateTime)).unwrap();
        assert_eq!(sql_to_json(value), json!("24.12.2023 18:30:00"));

        let value = json_to_sql(&json!("2023-12-24"), Some(ValueType::DateTime)).unwrap();
        assert_eq!(sql_to_json(value), json!("24.12.2023"));

        let value = json_to_sql(&json!("2023-12-24T08:00:00"), Some(ValueType::Date)).unwrap();
        assert_eq!(sql_to_json(value), json!("24.12.2023"));
    }

    #[test]
    fn test_untyped_values_follow_json_shape() {
        assert_eq!(json_to_sql(&json!(1.5), None).unwrap(), SqlValue::Float(1.5));
        assert_eq!(json_to_sql(&json!("x"), None).unwrap(), SqlValue::Text("x".into()));
        assert_eq!(json_to_sql(&json!(true), None).unwrap(), SqlValue::Bool(true));
    }

    #[test]
    fn test_decimal_to_json() {
        assert_eq!(sql_to_json(SqlValue::Decimal("12".into())), json!(12));
        assert_eq!(sql_to_json(SqlValue::Decimal("12.5".into())), json!(12.5));
    }

    #[test]
    fn test_uuid_conversion() {
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let value = json_to_sql(&json!(id), Some(ValueType::Uuid)).unwrap();
        assert_eq!(value, SqlValue::Uuid(Uuid::parse_str(id).unwrap()));
        assert_eq!(sql_to_json(value), json!(id));
    }
}
