use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use sqlgrid_core::error::GridError;
use sqlgrid_core::provider::{DatabasePool, DatabaseProvider, Dialect};
use sqlgrid_core::schema::{Column, ValueType};
use sqlgrid_core::synth::{BoundParameter, SynthesizedStatement};
use sqlgrid_core::value::SqlValue;
use sqlgrid_sqlite::SqliteProvider;

const SCHEMA: &[&str] = &[
    "CREATE TABLE customer (id INTEGER PRIMARY KEY, name VARCHAR(40) NOT NULL, joined DATE)",
    "CREATE TABLE orders (order_no INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customer(id), total NUMERIC)",
    "CREATE TABLE code (code TEXT NOT NULL, label TEXT)",
    "CREATE UNIQUE INDEX ux_code ON code (code)",
    "CREATE TABLE pair (a INTEGER, b INTEGER, PRIMARY KEY (a, b))",
    "CREATE TABLE two_unique (x INTEGER UNIQUE, y INTEGER UNIQUE)",
    "CREATE VIEW customer_names AS SELECT name FROM customer",
];

async fn setup() -> Arc<dyn DatabasePool> {
    let pool = SqliteProvider
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");
    let mut session = pool.begin().await.unwrap();
    for sql in SCHEMA {
        session.execute(&SynthesizedStatement::new(*sql)).await.unwrap();
    }
    session
        .execute(&SynthesizedStatement::new(
            "INSERT INTO customer (id, name, joined) VALUES (1, 'Ada', '2024-03-05'), (2, 'Bob', NULL), (3, 'Cy', NULL)",
        ))
        .await
        .unwrap();
    session.commit().await.unwrap();
    pool
}

fn statement(sql: &str, values: Vec<SqlValue>) -> SynthesizedStatement {
    SynthesizedStatement {
        sql: sql.to_string(),
        params: values
            .into_iter()
            .enumerate()
            .map(|(i, v)| BoundParameter::new(i, v))
            .collect(),
    }
}

#[tokio::test]
async fn test_tables_and_primary_keys() {
    let pool = setup().await;
    let tables = pool.tables().await.unwrap();
    let key_of = |name: &str| {
        tables
            .iter()
            .find(|t| t.table_name == name)
            .unwrap_or_else(|| panic!("missing table {name}"))
            .primary_key_column
            .clone()
    };

    assert_eq!(key_of("customer").as_deref(), Some("id"));
    assert_eq!(key_of("code").as_deref(), Some("code"));
    assert_eq!(key_of("pair"), None);
    assert_eq!(key_of("two_unique"), None);

    let view = tables
        .iter()
        .find(|t| t.table_name == "customer_names")
        .unwrap();
    assert!(view.is_view);
}

#[tokio::test]
async fn test_columns() {
    let pool = setup().await;
    let columns = pool.columns().await.unwrap();
    let name = columns
        .iter()
        .find(|c| c.table_name == "customer" && c.column_name == "name")
        .unwrap();
    assert_eq!(name.value_type, Some(ValueType::Text));
    assert_eq!(name.max_length, 40);
    assert!(!name.is_nullable);

    let joined = columns
        .iter()
        .find(|c| c.table_name == "customer" && c.column_name == "joined")
        .unwrap();
    assert_eq!(joined.value_type, Some(ValueType::Date));
    assert!(joined.is_nullable);
}

#[tokio::test]
async fn test_relations() {
    let pool = setup().await;
    let relations = pool.relations().await.unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].parent_table, "customer");
    assert_eq!(relations[0].parent_column, "id");
    assert_eq!(relations[0].child_table, "orders");
    assert_eq!(relations[0].child_column, "customer_id");
}

#[tokio::test]
async fn test_query_limits_rows() {
    let pool = setup().await;
    let mut session = pool.begin().await.unwrap();

    let all = session
        .query(&SynthesizedStatement::new("SELECT id, name FROM customer ORDER BY id"), Some(2))
        .await
        .unwrap();
    assert_eq!(all.rows.len(), 2);
    assert!(all.has_more_rows);
    assert_eq!(all.columns[1].name, "name");
    assert_eq!(all.rows[0], vec![SqlValue::Int(1), SqlValue::Text("Ada".into())]);

    let exact = session
        .query(&SynthesizedStatement::new("SELECT id FROM customer"), Some(3))
        .await
        .unwrap();
    assert_eq!(exact.rows.len(), 3);
    assert!(!exact.has_more_rows);

    let empty = session
        .query(&SynthesizedStatement::new("SELECT id, name FROM customer WHERE 1 = 0"), None)
        .await
        .unwrap();
    assert!(empty.rows.is_empty());
    assert_eq!(empty.columns.len(), 2);
    session.rollback().await.unwrap();
}

#[tokio::test]
async fn test_bound_parameters() {
    let pool = setup().await;
    let mut session = pool.begin().await.unwrap();
    let result = session
        .query(
            &statement(
                "SELECT name FROM customer WHERE id = ?1 OR name = ?2",
                vec![SqlValue::Int(2), SqlValue::Text("Cy".into())],
            ),
            None,
        )
        .await
        .unwrap();
    let names: Vec<SqlValue> = result.rows.into_iter().flatten().collect();
    assert_eq!(
        names,
        vec![SqlValue::Text("Bob".into()), SqlValue::Text("Cy".into())]
    );
    session.rollback().await.unwrap();
}

#[tokio::test]
async fn test_rollback_and_commit() {
    let pool = setup().await;
    let update = statement(
        "UPDATE customer SET name = ?1 WHERE id = ?2",
        vec![SqlValue::Text("Ada L.".into()), SqlValue::Int(1)],
    );
    let read = SynthesizedStatement::new("SELECT name FROM customer WHERE id = 1");

    let mut session = pool.begin().await.unwrap();
    assert_eq!(session.execute(&update).await.unwrap(), 1);
    session.rollback().await.unwrap();

    let mut session = pool.begin().await.unwrap();
    let before = session.query(&read, None).await.unwrap();
    assert_eq!(before.rows[0][0], SqlValue::Text("Ada".into()));
    assert_eq!(session.execute(&update).await.unwrap(), 1);
    session.commit().await.unwrap();

    let mut session = pool.begin().await.unwrap();
    let after = session.query(&read, None).await.unwrap();
    assert_eq!(after.rows[0][0], SqlValue::Text("Ada L.".into()));
    session.rollback().await.unwrap();
}

#[tokio::test]
async fn test_execution_error_carries_sql() {
    let pool = setup().await;
    let mut session = pool.begin().await.unwrap();
    let err = session
        .execute(&SynthesizedStatement::new("UPDATE missing SET x = 1"))
        .await
        .unwrap_err();
    match err {
        GridError::Execution { message, sql } => {
            assert!(message.contains("missing"), "{message}");
            assert_eq!(sql, "UPDATE missing SET x = 1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_create_table_if_not_exists() {
    let pool = setup().await;
    let columns = [
        Column::new("SETTINGS", "ID", ValueType::Text).max_length(64).not_null(),
        Column::new("SETTINGS", "DATA", ValueType::Text),
    ];
    assert!(pool.create_table_if_not_exists("SETTINGS", &columns).await.unwrap());
    assert!(!pool.create_table_if_not_exists("settings", &columns).await.unwrap());

    let tables = pool.tables().await.unwrap();
    assert!(tables.iter().any(|t| t.table_name == "SETTINGS"));
}

#[tokio::test]
async fn test_storage_round_trip() {
    let pool = setup().await;
    let provider = SqliteProvider;
    let mut session = pool.begin().await.unwrap();

    let joined = provider
        .convert_to_storage(&json!("24.12.2023"), Some(ValueType::Date))
        .unwrap();
    session
        .execute(&statement(
            "UPDATE customer SET joined = ?1 WHERE id = ?2",
            vec![joined, SqlValue::Int(2)],
        ))
        .await
        .unwrap();
    let result = session
        .query(&SynthesizedStatement::new("SELECT joined FROM customer WHERE id = 2"), None)
        .await
        .unwrap();
    let value = result.rows[0][0].clone();
    assert_eq!(
        provider.convert_from_storage(value, Some(ValueType::Date)),
        json!("24.12.2023")
    );
    session.rollback().await.unwrap();
}
