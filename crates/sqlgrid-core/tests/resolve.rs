mod common;

use common::{field_names, resolve, schema};
use sqlgrid_core::resolve::SelectResolution;
use sqlgrid_core::{RowState, ValueType};

#[test]
fn test_single_table_keys_and_saves() {
    let resolution = resolve("SELECT id, name FROM T");
    assert!(resolution.can_save());
    assert_eq!(field_names(resolution.column_keys()), ["id"]);
    assert_eq!(field_names(resolution.column_saves()), ["name"]);
    assert_eq!(resolution.table_save().unwrap().table_name, "T");
}

#[test]
fn test_internal_field_names_are_dense() {
    let resolution = resolve("select name, id, 1 + 1 as two from T");
    let fields: Vec<&str> = resolution
        .columns()
        .iter()
        .map(|c| c.internal_field_name.as_str())
        .collect();
    assert_eq!(fields, ["f1", "f2", "f3"]);
}

#[test]
fn test_multi_table_projection_rejects_save() {
    let resolution = resolve("SELECT a.id, b.x FROM T a, U b");
    assert!(!resolution.can_save());
    assert!(resolution.column_keys().is_empty());
    assert!(resolution.column_saves().is_empty());
}

#[test]
fn test_aliased_single_table() {
    let resolution = resolve("select t.id, t.name as Title from T t where t.id > 3");
    assert!(resolution.can_save());
    assert_eq!(field_names(resolution.column_keys()), ["id"]);
    assert_eq!(resolution.column_saves()[0].caption, "Title");
    assert_eq!(resolution.columns()[0].caption, "t.id");
}

#[test]
fn test_untyped_and_unknown_columns_are_not_saved() {
    let resolution = resolve("select id, name, note, missing, upper(name) u from T");
    assert!(resolution.can_save());
    assert_eq!(field_names(resolution.column_saves()), ["name"]);
}

#[test]
fn test_duplicate_key_projection_disables_save() {
    let resolution = resolve("select id, id as again, name from T");
    assert!(!resolution.can_save());
}

#[test]
fn test_missing_key_projection_keeps_save() {
    let resolution = resolve("select name from T");
    assert!(resolution.can_save());
    assert!(resolution.column_keys().is_empty());
    assert_eq!(field_names(resolution.column_saves()), ["name"]);
}

#[test]
fn test_table_without_key() {
    let resolution = resolve("select code, label from V");
    assert!(resolution.can_save());
    assert!(resolution.column_keys().is_empty());
    assert_eq!(field_names(resolution.column_saves()), ["code", "label"]);
}

#[test]
fn test_unknown_or_invalid_table() {
    assert!(!resolve("select a from nowhere").can_save());
    assert!(!resolve("select id from T inner join U on U.t_id = T.id").can_save());
    assert!(!resolve("select 1").can_save());
}

#[test]
fn test_save_requires_schema() {
    assert!(!SelectResolution::resolve(None, "select id, name from T").can_save());
}

#[test]
fn test_quoted_key_column_matches() {
    let resolution = resolve("select \"id\", name from T");
    assert_eq!(field_names(resolution.column_keys()), ["\"id\""]);
}

#[test]
fn test_projection_types_and_relations() {
    let resolution = resolve("select u.id, u.t_id, u.x from U u");
    let columns = resolution.columns();
    assert_eq!(columns[0].value_type, Some(ValueType::Integer));
    assert_eq!(columns[1].related_table_name.as_deref(), Some("T"));
    assert_eq!(columns[1].related_column_name.as_deref(), Some("id"));
    assert!(columns[2].alias_is_table);
}

#[test]
fn test_can_edit_depends_on_state() {
    let resolution = resolve("select id, name from T");
    assert!(resolution.can_edit("f2", RowState::Modified));
    assert!(!resolution.can_edit("f1", RowState::Modified));
    assert!(resolution.can_edit("f1", RowState::New));
    assert!(!resolution.can_edit("f9", RowState::New));
}

#[test]
fn test_refresh_columns_for_star() {
    let schema = schema();
    let mut resolution = SelectResolution::resolve(Some(&schema), "select * from T");
    assert!(resolution.column_saves().is_empty());

    let names = vec!["id".to_string(), "name".to_string(), "note".to_string()];
    resolution.refresh_columns(Some(&schema), &names);
    assert_eq!(resolution.columns().len(), 3);
    assert_eq!(resolution.columns()[2].internal_field_name, "f3");
    assert_eq!(field_names(resolution.column_keys()), ["id"]);
    assert_eq!(field_names(resolution.column_saves()), ["name"]);
}

#[test]
fn test_parameters_are_collected() {
    let resolution = resolve("select id from T where name = <#Name#> or id = <#f#> or name = <#Name#>");
    assert_eq!(resolution.parameters(), ["Name", "f"]);
}
