#![allow(dead_code)]

use sqlgrid_core::resolve::SelectResolution;
use sqlgrid_core::schema::{Column, Relation, SchemaSnapshot, Table, ValueType};
use sqlgrid_core::Dialect;

/// Dialect with `?N` placeholders and a tiny reserved-word list.
pub struct QDialect;

impl Dialect for QDialect {
    fn name(&self) -> &'static str {
        "test"
    }

    fn parameter_prefix(&self) -> &'static str {
        "?"
    }

    fn is_reserved_word(&self, word: &str) -> bool {
        ["select", "from", "order", "group"]
            .iter()
            .any(|w| w.eq_ignore_ascii_case(word))
    }

    fn value_type_of(&self, _type_name: &str) -> Option<ValueType> {
        None
    }

    fn column_type_sql(&self, _column: &Column) -> String {
        String::from("TEXT")
    }
}

/// `T(id PK, name, note untyped)`, `U(id PK, t_id -> T.id, x)`, `V(code)` without key.
pub fn schema() -> SchemaSnapshot {
    SchemaSnapshot::builder()
        .table(Table::new("T").primary_key("id"))
        .table(Table::new("U").primary_key("id"))
        .table(Table::new("V"))
        .column(Column::new("T", "id", ValueType::Integer).not_null())
        .column(Column::new("T", "name", ValueType::Text).max_length(100))
        .column(Column::untyped("T", "note", "GEOMETRY"))
        .column(Column::new("U", "id", ValueType::Integer))
        .column(Column::new("U", "t_id", ValueType::Integer))
        .column(Column::new("U", "x", ValueType::Text))
        .column(Column::new("V", "code", ValueType::Text))
        .column(Column::new("V", "label", ValueType::Text))
        .relation(Relation::new("T", "id", "U", "t_id"))
        .build()
}

pub fn resolve(sql: &str) -> SelectResolution {
    SelectResolution::resolve(Some(&schema()), sql)
}

pub fn field_names(columns: &[sqlgrid_core::ColumnProjection]) -> Vec<&str> {
    columns.iter().map(|c| c.column_name.as_str()).collect()
}
