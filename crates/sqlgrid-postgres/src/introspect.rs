//! Catalog queries against the current schema.
//!
//! Catalog columns use domain types (`sql_identifier`, `cardinal_number`),
//! so every column is cast to a plain type before decoding.

use sqlgrid_core::error::{GridError, Result};
use sqlgrid_core::provider::Dialect;
use sqlgrid_core::schema::{resolve_primary_keys, Column, KeyCandidate, KeySource, Relation, Table};
use sqlx::postgres::PgPool;

use crate::dialect::PostgresProvider;

const LIST_RELATIONS_SQL: &str = "SELECT table_name::text, table_type::text \
     FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_type IN ('BASE TABLE', 'VIEW') \
     ORDER BY table_name";

const LIST_COLUMNS_SQL: &str = "SELECT table_name::text, column_name::text, data_type::text, \
     COALESCE(character_maximum_length, 0)::int4, is_nullable::text \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() \
     ORDER BY table_name, ordinal_position";

const KEY_CANDIDATES_SQL: &str = "SELECT t.relname::text, i.relname::text, a.attname::text, ix.indisprimary \
     FROM pg_index ix \
     JOIN pg_class t ON t.oid = ix.indrelid \
     JOIN pg_class i ON i.oid = ix.indexrelid \
     JOIN pg_namespace n ON n.oid = t.relnamespace \
     JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
     WHERE n.nspname = current_schema() \
       AND (ix.indisprimary OR ix.indisunique) \
       AND ix.indpred IS NULL AND ix.indexprs IS NULL";

const FOREIGN_KEYS_SQL: &str = "SELECT pt.relname::text, pa.attname::text, ct.relname::text, ca.attname::text \
     FROM pg_constraint c \
     JOIN pg_class ct ON ct.oid = c.conrelid \
     JOIN pg_class pt ON pt.oid = c.confrelid \
     JOIN pg_namespace n ON n.oid = ct.relnamespace \
     CROSS JOIN LATERAL unnest(c.conkey, c.confkey) AS k(child_attnum, parent_attnum) \
     JOIN pg_attribute ca ON ca.attrelid = c.conrelid AND ca.attnum = k.child_attnum \
     JOIN pg_attribute pa ON pa.attrelid = c.confrelid AND pa.attnum = k.parent_attnum \
     WHERE c.contype = 'f' AND n.nspname = current_schema() \
     ORDER BY ct.relname, ca.attnum";

const TABLE_EXISTS_SQL: &str = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
       AND lower(table_name) = lower($1))";

/// Lists tables and views with their resolved single key column.
pub async fn tables(pool: &PgPool) -> Result<Vec<Table>> {
    let relations: Vec<(String, String)> = sqlx::query_as(LIST_RELATIONS_SQL)
        .fetch_all(pool)
        .await
        .map_err(GridError::database)?;

    let rows: Vec<(String, String, String, bool)> = sqlx::query_as(KEY_CANDIDATES_SQL)
        .fetch_all(pool)
        .await
        .map_err(GridError::database)?;
    let candidates: Vec<KeyCandidate> = rows
        .into_iter()
        .map(|(table, index, column, primary)| {
            let source = if primary {
                KeySource::PrimaryKey
            } else {
                KeySource::UniqueIndex
            };
            KeyCandidate::new(table, index, column, source)
        })
        .collect();
    let keys = resolve_primary_keys(&candidates);

    Ok(relations
        .into_iter()
        .map(|(name, kind)| Table {
            primary_key_column: keys.get(&name.to_lowercase()).cloned(),
            is_view: kind == "VIEW",
            table_name: name,
        })
        .collect())
}

/// Lists the columns of every table and view.
pub async fn columns(pool: &PgPool, dialect: &PostgresProvider) -> Result<Vec<Column>> {
    let rows: Vec<(String, String, String, i32, String)> = sqlx::query_as(LIST_COLUMNS_SQL)
        .fetch_all(pool)
        .await
        .map_err(GridError::database)?;
    Ok(rows
        .into_iter()
        .map(|(table, name, type_name, max_length, nullable)| Column {
            table_name: table,
            column_name: name,
            value_type: dialect.value_type_of(&type_name),
            max_length: u32::try_from(max_length).unwrap_or(0),
            is_nullable: nullable == "YES",
            type_name,
            related_table_name: None,
            related_column_name: None,
        })
        .collect())
}

/// Lists foreign keys, one edge per column pair.
pub async fn relations(pool: &PgPool) -> Result<Vec<Relation>> {
    let rows: Vec<(String, String, String, String)> = sqlx::query_as(FOREIGN_KEYS_SQL)
        .fetch_all(pool)
        .await
        .map_err(GridError::database)?;
    Ok(rows
        .into_iter()
        .map(|(parent, parent_column, child, child_column)| {
            Relation::new(parent, parent_column, child, child_column)
        })
        .collect())
}

/// Returns true if a base table with this name exists, ignoring case.
pub async fn table_exists(pool: &PgPool, table: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(TABLE_EXISTS_SQL)
        .bind(table)
        .fetch_one(pool)
        .await
        .map_err(GridError::database)?;
    Ok(exists)
}
