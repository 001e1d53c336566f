mod common;

use common::{resolve, QDialect};
use pretty_assertions::assert_eq;
use serde_json::json;
use sqlgrid_core::param::{bind_parameters, parameter_names, ParameterSource};
use sqlgrid_core::synth::{build_delete, build_insert, build_update, plan_save, SaveAction};
use sqlgrid_core::{GridError, Row, RowState, SqlValue};

fn row(value: serde_json::Value) -> Row {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_update_binds_set_then_key() {
    let resolution = resolve("SELECT id, name FROM T");
    let row = row(json!({"f1": 5, "f2": "X", "_state": 1, "_changed": {"f2": true}}));

    let statement = build_update(&QDialect, &resolution, &row).unwrap().unwrap();
    assert_eq!(statement.sql, "UPDATE T SET name = ?1 WHERE id = ?2");
    let values: Vec<&SqlValue> = statement.values().collect();
    assert_eq!(values, [&SqlValue::Text("X".into()), &SqlValue::Int(5)]);
    assert_eq!(statement.params[0].name, "p0");
    assert_eq!(statement.params[1].name, "p1");
}

#[test]
fn test_update_without_changes_is_skipped() {
    let resolution = resolve("SELECT id, name FROM T");
    let row = row(json!({"f1": 5, "f2": "X", "_state": 1, "_changed": {"f2": false}}));
    assert!(build_update(&QDialect, &resolution, &row).unwrap().is_none());
}

#[test]
fn test_update_without_key_is_rejected() {
    let resolution = resolve("SELECT name FROM T");
    let row = row(json!({"f1": "X", "_state": 1, "_changed": {"f1": true}}));
    assert!(matches!(
        build_update(&QDialect, &resolution, &row),
        Err(GridError::MissingKeyPredicate(table)) if table == "T"
    ));
    assert!(matches!(
        build_delete(&QDialect, &resolution, &row),
        Err(GridError::MissingKeyPredicate(_))
    ));
}

#[test]
fn test_insert_skips_null_values() {
    let resolution = resolve("SELECT id, name, upper(name) shout FROM T");
    let row = row(json!({"f1": null, "f2": "Neu", "f3": "NEU", "_state": 2}));

    let statement = build_insert(&QDialect, &resolution, &row).unwrap();
    assert_eq!(statement.sql, "INSERT INTO T (name) VALUES (?1)");
    assert_eq!(statement.params[0].value, SqlValue::Text("Neu".into()));
}

#[test]
fn test_insert_includes_key_when_given() {
    let resolution = resolve("SELECT id, name FROM T");
    let row = row(json!({"f1": "7", "f2": "", "_state": 2}));
    let statement = build_insert(&QDialect, &resolution, &row).unwrap();
    assert_eq!(statement.sql, "INSERT INTO T (id) VALUES (?1)");
    assert_eq!(statement.params[0].value, SqlValue::Int(7));
}

#[test]
fn test_insert_default_values() {
    let resolution = resolve("SELECT id, name FROM T");
    let statement = build_insert(&QDialect, &resolution, &row(json!({"_state": 2}))).unwrap();
    assert_eq!(statement.sql, "INSERT INTO T DEFAULT VALUES");
    assert!(statement.params.is_empty());
}

#[test]
fn test_insert_keeps_projected_columns_without_type() {
    let resolution = resolve("SELECT id, name, note FROM T");
    let row = row(json!({"f1": 4, "f2": "Neu", "f3": "POINT(1 2)", "_state": 2}));

    let statement = build_insert(&QDialect, &resolution, &row).unwrap();
    assert_eq!(statement.sql, "INSERT INTO T (id, name, note) VALUES (?1, ?2, ?3)");
    assert_eq!(statement.params[2].value, SqlValue::Text("POINT(1 2)".into()));
}

#[test]
fn test_insert_keeps_unqualified_columns_with_several_tables() {
    let resolution = resolve("SELECT id, name FROM T t, U u");
    assert!(resolution.can_save());
    assert!(resolution.column_saves().is_empty());

    let row = row(json!({"f1": 7, "f2": "Neu", "_state": 2}));
    let statement = build_insert(&QDialect, &resolution, &row).unwrap();
    assert_eq!(statement.sql, "INSERT INTO T (id, name) VALUES (?1, ?2)");
    assert_eq!(statement.params[1].value, SqlValue::Text("Neu".into()));
}

#[test]
fn test_insert_refuses_to_drop_values() {
    let resolution = resolve("SELECT upper(name) shout FROM T");
    assert!(resolution.can_save());

    let filled = row(json!({"f1": "NEU", "_state": 2}));
    assert!(matches!(
        build_insert(&QDialect, &resolution, &filled),
        Err(GridError::NotSaveable)
    ));

    let blank = row(json!({"f1": "", "_state": 2}));
    let statement = build_insert(&QDialect, &resolution, &blank).unwrap();
    assert_eq!(statement.sql, "INSERT INTO T DEFAULT VALUES");
}

#[test]
fn test_delete_uses_key() {
    let resolution = resolve("SELECT t.id, t.name FROM T t");
    let statement = build_delete(&QDialect, &resolution, &row(json!({"f1": 9, "_state": 3}))).unwrap();
    assert_eq!(statement.sql, "DELETE FROM T WHERE id = ?1");
    assert_eq!(statement.params[0].value, SqlValue::Int(9));
}

#[test]
fn test_not_saveable_statement() {
    let resolution = resolve("SELECT a.id, b.x FROM T a, U b");
    assert!(matches!(
        build_delete(&QDialect, &resolution, &Row::new()),
        Err(GridError::NotSaveable)
    ));
}

#[test]
fn test_plan_save_dispatches_by_state() {
    let resolution = resolve("SELECT id, name FROM T");
    let rows = vec![
        row(json!({"f1": 1, "f2": "a", "_state": 0})),
        row(json!({"f1": 2, "f2": "b", "_state": 1, "_changed": {"f2": true}})),
        row(json!({"f1": 3, "f2": "c", "_state": 2})),
        row(json!({"f1": 4, "f2": "d", "_state": 3})),
        row(json!({"f1": 5, "f2": "e", "_state": "1"})),
        row(json!({"f1": 6, "f2": "f", "_state": 1})),
    ];
    let plan = plan_save(&QDialect, &resolution, &rows).unwrap();
    let actions: Vec<SaveAction> = plan.iter().map(|(action, _)| *action).collect();
    assert_eq!(actions, [SaveAction::Update, SaveAction::Insert, SaveAction::Delete]);
    assert_eq!(plan[1].1.sql, "INSERT INTO T (id, name) VALUES (?1, ?2)");
}

#[test]
fn test_conversion_failure_surfaces() {
    let resolution = resolve("SELECT id, name FROM T");
    let row = row(json!({"f1": "abc", "f2": "x", "_state": 3}));
    assert!(matches!(
        build_delete(&QDialect, &resolution, &row),
        Err(GridError::Conversion { .. })
    ));
}

#[test]
fn test_bind_parameters_by_caption() {
    let source = resolve("select id, name as Title from T");
    let data = Row::new().with("f1", 4).with("f2", "Anna").with_state(RowState::Loaded);
    let statement = bind_parameters(
        &QDialect,
        "update U set x = <#Title#> where t_id = <#id#> and x <> <#Title#>",
        Some(ParameterSource {
            columns: source.columns(),
            row: &data,
        }),
    )
    .unwrap();
    assert_eq!(statement.sql, "update U set x = ?1 where t_id = ?2 and x <> ?1");
    assert_eq!(statement.params[0].value, SqlValue::Text("Anna".into()));
    assert_eq!(statement.params[1].value, SqlValue::Int(4));
}

#[test]
fn test_bind_parameters_unknown_caption() {
    let source = resolve("select id from T");
    let data = Row::new();
    let result = bind_parameters(
        &QDialect,
        "select * from U where x = <#Nope#>",
        Some(ParameterSource {
            columns: source.columns(),
            row: &data,
        }),
    );
    assert!(matches!(result, Err(GridError::ParameterNotFound(name)) if name == "Nope"));
}

#[test]
fn test_bind_without_source_passes_text() {
    let statement = bind_parameters(&QDialect, "select <#x#>", None).unwrap();
    assert_eq!(statement.sql, "select <#x#>");
    assert_eq!(parameter_names("a <#x#> <#y\nz#> <#x#>"), ["x", "y\nz"]);
}
