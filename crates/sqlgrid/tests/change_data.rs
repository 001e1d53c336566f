mod common;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sqlgrid::service::{ExecuteResponse, TableData, TransactionRequest};
use sqlgrid::{Service, ServiceError};
use sqlgrid_core::row::RowState;

use common::DATABASE_ID;

fn change_request(rules: Value) -> TableData {
    serde_json::from_value(json!({
        "databaseId": DATABASE_ID,
        "columns": [
            {"caption": "id", "internalFieldName": "f1", "type": "integer"},
            {"caption": "name", "internalFieldName": "f2", "type": "text"},
            {"caption": "n", "internalFieldName": "f3"},
            {"caption": "orders", "internalFieldName": "f4"}
        ],
        "data": [
            {"f1": 1, "f2": "Ada", "_state": 0},
            {"f1": 2, "f2": "Bob", "_state": 0},
            {"f1": 3, "f2": "Cy", "_state": 0}
        ],
        "changeData": rules
    }))
    .unwrap()
}

async fn count(service: &Service, table: &str) -> Value {
    let response = service
        .execute(TableData {
            database_id: DATABASE_ID,
            script: format!("SELECT count(*) FROM {table}"),
            ..TableData::default()
        })
        .await
        .unwrap();
    match response {
        Some(ExecuteResponse::Query(response)) => response.result.data[0].value("f1").clone(),
        other => panic!("expected query response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rules_apply_in_order_per_row() {
    let service = common::service().await;
    let result = service
        .execute_changes(change_request(json!([
            {"type": "running", "internalFieldName": "f3", "running": 10},
            {
                "type": "sql",
                "internalFieldName": "f4",
                "databaseId": DATABASE_ID,
                "script": "SELECT count(*) FROM orders WHERE customer_id = <#id#>"
            },
            {
                "type": "sql",
                "internalFieldName": "f5",
                "databaseId": DATABASE_ID,
                "script": "INSERT INTO audit (note) VALUES (<#name#>)"
            },
            {"type": "text", "internalFieldName": "f6", "text": "checked"},
            {"type": "code", "internalFieldName": "f7", "script": "[n] * 2"}
        ])))
        .await
        .unwrap();

    let column = |field: &str| -> Vec<Value> {
        result.data.iter().map(|row| row.value(field).clone()).collect()
    };
    assert_eq!(column("f3"), [json!(10), json!(11), json!(12)]);
    assert_eq!(column("f4"), [json!(2), json!(1), json!(0)]);
    assert_eq!(column("f6"), [json!("checked"); 3]);
    assert_eq!(column("f7"), [json!(20), json!(22), json!(24)]);
    assert_eq!(result.data[0].state(), Some(RowState::Modified));
    assert!(result.data[0].is_changed("f4"));
    assert!(!result.data[0].is_changed("f2"));

    assert_eq!(result.changed_rows, 3);
    let transaction_id = result.transaction_id.clone().expect("kept transaction");

    let outcome = service
        .commit(TransactionRequest { transaction_id })
        .await
        .unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.data.as_deref(), Some(result.data.as_slice()));
    assert_eq!(count(&service, "audit").await, json!(3));
}

#[tokio::test]
async fn test_queries_alone_keep_no_transaction() {
    let service = common::service().await;
    let result = service
        .execute_changes(change_request(json!([
            {
                "type": "sql",
                "internalFieldName": "f4",
                "databaseId": DATABASE_ID,
                "script": "SELECT name FROM customer WHERE id = <#id#>"
            },
            {"type": "running", "internalFieldName": "f3", "running": "ten"},
            {"type": "chart", "internalFieldName": "f3"}
        ])))
        .await
        .unwrap();

    assert_eq!(result.transaction_id, None);
    assert_eq!(result.changed_rows, 0);
    assert_eq!(result.data[2].value("f4"), &json!("Cy"));
    assert_eq!(result.data[0].value("f3"), &Value::Null);
    assert!(service.transactions().is_empty());
    assert_eq!(
        serde_json::to_value(&result).unwrap()["transactionId"],
        Value::Null
    );
}

#[tokio::test]
async fn test_failing_rule_rolls_back_statements() {
    let service = common::service().await;
    let result = service
        .execute_changes(change_request(json!([
            {
                "type": "sql",
                "internalFieldName": "f5",
                "databaseId": DATABASE_ID,
                "script": "INSERT INTO audit (note) VALUES (<#name#>)"
            },
            {"type": "code", "internalFieldName": "f6", "script": "1 +"}
        ])))
        .await;

    assert!(matches!(result, Err(ServiceError::Script(_))));
    assert!(service.transactions().is_empty());
    assert_eq!(count(&service, "audit").await, json!(0));
}

#[tokio::test]
async fn test_unknown_database_in_rule() {
    let service = common::service().await;
    let result = service
        .execute_changes(change_request(json!([
            {
                "type": "sql",
                "internalFieldName": "f4",
                "databaseId": 99,
                "script": "SELECT 1"
            }
        ])))
        .await;
    assert!(matches!(result, Err(ServiceError::UnknownDatabase(99))));
}
