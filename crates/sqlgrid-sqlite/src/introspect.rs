//! Catalog queries.
//!
//! Tables and views come from `sqlite_master`; everything else from the
//! table-valued pragma functions, one table at a time.

use sqlgrid_core::error::{GridError, Result};
use sqlgrid_core::provider::Dialect;
use sqlgrid_core::schema::{resolve_primary_keys, Column, KeyCandidate, KeySource, Relation, Table};
use sqlx::sqlite::SqlitePool;

use crate::dialect::{declared_length, SqliteProvider};

const LIST_RELATIONS_SQL: &str = "SELECT name, type FROM sqlite_master \
     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name";

const TABLE_INFO_SQL: &str = "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid";

const UNIQUE_INDEXES_SQL: &str =
    "SELECT name FROM pragma_index_list(?1) WHERE \"unique\" = 1 AND origin <> 'pk'";

const INDEX_COLUMNS_SQL: &str = "SELECT name FROM pragma_index_info(?1) ORDER BY seqno";

const FOREIGN_KEYS_SQL: &str = "SELECT \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?1)";

const TABLE_EXISTS_SQL: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE";

async fn relation_names(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    sqlx::query_as(LIST_RELATIONS_SQL)
        .fetch_all(pool)
        .await
        .map_err(GridError::database)
}

async fn table_info(pool: &SqlitePool, table: &str) -> Result<Vec<(String, String, i64, i64)>> {
    sqlx::query_as(TABLE_INFO_SQL)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(GridError::database)
}

async fn key_candidates(pool: &SqlitePool, table: &str) -> Result<Vec<KeyCandidate>> {
    let mut candidates: Vec<KeyCandidate> = table_info(pool, table)
        .await?
        .into_iter()
        .filter(|(_, _, _, pk)| *pk > 0)
        .map(|(name, _, _, _)| KeyCandidate::new(table, "pk", name, KeySource::PrimaryKey))
        .collect();

    let indexes: Vec<(String,)> = sqlx::query_as(UNIQUE_INDEXES_SQL)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(GridError::database)?;
    for (index,) in indexes {
        let columns: Vec<(Option<String>,)> = sqlx::query_as(INDEX_COLUMNS_SQL)
            .bind(&index)
            .fetch_all(pool)
            .await
            .map_err(GridError::database)?;
        // Expression indexes report a NULL column name.
        for (column,) in columns {
            candidates.push(KeyCandidate::new(
                table,
                index.as_str(),
                column.unwrap_or_default(),
                KeySource::UniqueIndex,
            ));
        }
    }
    Ok(candidates)
}

/// Lists tables and views with their resolved single key column.
pub async fn tables(pool: &SqlitePool) -> Result<Vec<Table>> {
    let relations = relation_names(pool).await?;
    let mut candidates = Vec::new();
    for (name, kind) in &relations {
        if kind == "table" {
            candidates.extend(key_candidates(pool, name).await?);
        }
    }
    let keys = resolve_primary_keys(&candidates);

    Ok(relations
        .into_iter()
        .map(|(name, kind)| Table {
            primary_key_column: keys.get(&name.to_lowercase()).cloned(),
            is_view: kind == "view",
            table_name: name,
        })
        .collect())
}

/// Lists the columns of every table and view.
pub async fn columns(pool: &SqlitePool, dialect: &SqliteProvider) -> Result<Vec<Column>> {
    let mut columns = Vec::new();
    for (table, _) in relation_names(pool).await? {
        for (name, type_name, not_null, _) in table_info(pool, &table).await? {
            columns.push(Column {
                table_name: table.clone(),
                column_name: name,
                value_type: dialect.value_type_of(&type_name),
                max_length: declared_length(&type_name),
                is_nullable: not_null == 0,
                type_name,
                related_table_name: None,
                related_column_name: None,
            });
        }
    }
    Ok(columns)
}

/// Lists foreign keys. A reference without an explicit target column
/// points at the parent's primary key.
pub async fn relations(pool: &SqlitePool) -> Result<Vec<Relation>> {
    let names = relation_names(pool).await?;
    let mut relations = Vec::new();
    for (table, kind) in &names {
        if kind != "table" {
            continue;
        }
        let keys: Vec<(String, String, Option<String>)> = sqlx::query_as(FOREIGN_KEYS_SQL)
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(GridError::database)?;
        for (parent, from, to) in keys {
            let parent_column = match to {
                Some(column) => column,
                None => primary_key_of(pool, &parent).await?.unwrap_or_default(),
            };
            relations.push(Relation::new(parent, parent_column, table.as_str(), from));
        }
    }
    Ok(relations)
}

async fn primary_key_of(pool: &SqlitePool, table: &str) -> Result<Option<String>> {
    let keys = resolve_primary_keys(&key_candidates(pool, table).await?);
    Ok(keys.get(&table.to_lowercase()).cloned())
}

/// Returns true if a base table with this name exists, ignoring case.
pub async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let (count,): (i64,) = sqlx::query_as(TABLE_EXISTS_SQL)
        .bind(table)
        .fetch_one(pool)
        .await
        .map_err(GridError::database)?;
    Ok(count > 0)
}
