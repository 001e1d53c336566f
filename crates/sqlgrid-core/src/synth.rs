//! DML synthesis from a resolved `SELECT` and a row diff.
//!
//! Parameters are positional and named `p0`, `p1`, ... in emission order;
//! the dialect supplies the placeholder text and the storage conversion.

use tracing::debug;

use crate::error::{GridError, Result};
use crate::provider::Dialect;
use crate::resolve::{ColumnProjection, SelectResolution, TableReference};
use crate::row::{Row, RowState};
use crate::value::SqlValue;

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    /// Parameter name, `p{index}`.
    pub name: String,
    /// Value in storage form.
    pub value: SqlValue,
}

impl BoundParameter {
    /// Creates the parameter at a zero-based position.
    #[must_use]
    pub fn new(index: usize, value: SqlValue) -> Self {
        Self {
            name: format!("p{index}"),
            value,
        }
    }
}

/// Statement text plus ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStatement {
    /// SQL text with provider placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<BoundParameter>,
}

impl SynthesizedStatement {
    /// A statement without parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Parameter values in order.
    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.params.iter().map(|p| &p.value)
    }
}

/// Which DML a row produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    /// `INSERT` for a new row.
    Insert,
    /// `UPDATE` for a modified row.
    Update,
    /// `DELETE` for a deleted row.
    Delete,
}

struct Binder<'a> {
    dialect: &'a dyn Dialect,
    params: Vec<BoundParameter>,
}

impl<'a> Binder<'a> {
    const fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    fn bind_value(&mut self, value: SqlValue) -> String {
        let index = self.params.len();
        self.params.push(BoundParameter::new(index, value));
        self.dialect.placeholder(index)
    }

    fn convert(&self, column: &ColumnProjection, row: &Row) -> Result<SqlValue> {
        self.dialect
            .convert_to_storage(row.value(&column.internal_field_name), column.value_type)
    }

    fn key_predicate(&mut self, keys: &[ColumnProjection], row: &Row) -> Result<String> {
        let mut predicates = Vec::with_capacity(keys.len());
        for column in keys {
            let value = self.convert(column, row)?;
            let placeholder = self.bind_value(value);
            predicates.push(format!("{} = {placeholder}", column.column_name));
        }
        Ok(predicates.join(" AND "))
    }

    fn finish(self, sql: String) -> SynthesizedStatement {
        debug!(sql = %sql, params = self.params.len(), "Synthesized statement");
        SynthesizedStatement {
            sql,
            params: self.params,
        }
    }
}

fn save_table(resolution: &SelectResolution) -> Result<&TableReference> {
    resolution.table_save().ok_or(GridError::NotSaveable)
}

/// Builds the `INSERT` for a new row.
///
/// Candidates are the plain projected columns of the save table
/// (unqualified or qualified with its alias or name) plus any save column,
/// in projection order. Null or absent values are left out so identity and
/// defaulted columns can be filled by the database. A row without any
/// value inserts `DEFAULT VALUES`.
///
/// # Errors
///
/// [`GridError::NotSaveable`] when the statement has no save table, or
/// when the row carries values but none of them lands in a column of the
/// save table.
pub fn build_insert(
    dialect: &dyn Dialect,
    resolution: &SelectResolution,
    row: &Row,
) -> Result<SynthesizedStatement> {
    let table = save_table(resolution)?;
    let is_save = |c: &ColumnProjection| {
        resolution
            .column_saves()
            .iter()
            .any(|w| w.internal_field_name == c.internal_field_name)
    };
    let belongs = |c: &ColumnProjection| {
        c.is_valid
            && c.alias
                .as_deref()
                .map_or(true, |qualifier| table.answers_to(qualifier))
    };

    let mut binder = Binder::new(dialect);
    let mut names = Vec::new();
    let mut placeholders = Vec::new();
    for column in resolution.columns().iter().filter(|c| belongs(*c) || is_save(*c)) {
        let value = binder.convert(column, row)?;
        if value.is_null() {
            continue;
        }
        names.push(column.column_name.as_str());
        placeholders.push(binder.bind_value(value));
    }

    if names.is_empty() {
        let has_values = resolution
            .columns()
            .iter()
            .any(|c| carries_value(row.value(&c.internal_field_name)));
        if has_values {
            return Err(GridError::NotSaveable);
        }
        return Ok(binder.finish(format!("INSERT INTO {} DEFAULT VALUES", table.table_name)));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.table_name,
        names.join(", "),
        placeholders.join(", ")
    );
    Ok(binder.finish(sql))
}

/// Empty strings count as null, as they do when converted for storage.
fn carries_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Builds the `UPDATE` for a modified row.
///
/// Only save columns whose changed flag is `true` are set. Returns
/// `Ok(None)` when nothing changed.
///
/// # Errors
///
/// [`GridError::MissingKeyPredicate`] when the statement has no key column.
pub fn build_update(
    dialect: &dyn Dialect,
    resolution: &SelectResolution,
    row: &Row,
) -> Result<Option<SynthesizedStatement>> {
    let table = save_table(resolution)?;
    let mut binder = Binder::new(dialect);
    let mut assignments = Vec::new();
    for column in resolution.column_saves() {
        if !row.is_changed(&column.internal_field_name) {
            continue;
        }
        let value = binder.convert(column, row)?;
        let placeholder = binder.bind_value(value);
        assignments.push(format!("{} = {placeholder}", column.column_name));
    }

    if assignments.is_empty() {
        return Ok(None);
    }
    if resolution.column_keys().is_empty() {
        return Err(GridError::MissingKeyPredicate(table.table_name.clone()));
    }

    let predicate = binder.key_predicate(resolution.column_keys(), row)?;
    let sql = format!(
        "UPDATE {} SET {} WHERE {predicate}",
        table.table_name,
        assignments.join(", ")
    );
    Ok(Some(binder.finish(sql)))
}

/// Builds the `DELETE` for a deleted row.
///
/// # Errors
///
/// [`GridError::MissingKeyPredicate`] when the statement has no key column.
pub fn build_delete(
    dialect: &dyn Dialect,
    resolution: &SelectResolution,
    row: &Row,
) -> Result<SynthesizedStatement> {
    let table = save_table(resolution)?;
    if resolution.column_keys().is_empty() {
        return Err(GridError::MissingKeyPredicate(table.table_name.clone()));
    }
    let mut binder = Binder::new(dialect);
    let predicate = binder.key_predicate(resolution.column_keys(), row)?;
    let sql = format!("DELETE FROM {} WHERE {predicate}", table.table_name);
    Ok(binder.finish(sql))
}

/// Statements for a batch of rows, in row order.
///
/// Loaded rows, rows without a valid state, and modified rows without
/// changed fields produce nothing.
pub fn plan_save(
    dialect: &dyn Dialect,
    resolution: &SelectResolution,
    rows: &[Row],
) -> Result<Vec<(SaveAction, SynthesizedStatement)>> {
    let mut plan = Vec::new();
    for row in rows {
        match row.state() {
            Some(RowState::Modified) => {
                if let Some(statement) = build_update(dialect, resolution, row)? {
                    plan.push((SaveAction::Update, statement));
                }
            }
            Some(RowState::New) => plan.push((SaveAction::Insert, build_insert(dialect, resolution, row)?)),
            Some(RowState::Deleted) => plan.push((SaveAction::Delete, build_delete(dialect, resolution, row)?)),
            Some(RowState::Loaded) | None => {}
        }
    }
    Ok(plan)
}
