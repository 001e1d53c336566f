//! Statement execution on a session: queries into rows, non-queries and
//! batch saves, each under the command timeout.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use sqlgrid_core::format::{format_statement, SqlFormatRule};
use sqlgrid_core::param::{bind_parameters, ParameterSource};
use sqlgrid_core::provider::{DatabaseSession, Dialect};
use sqlgrid_core::resolve::SelectResolution;
use sqlgrid_core::row::Row;
use sqlgrid_core::schema::SchemaSnapshot;
use sqlgrid_core::synth::{plan_save, SaveAction, SynthesizedStatement};
use tracing::debug;

use crate::error::{Result, ServiceError};

/// Rows read by a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Rows keyed by internal field name.
    pub data: Vec<Row>,
    /// True when the row limit cut the result short.
    pub has_more_rows: bool,
}

/// Runs statements with a fixed command timeout.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    timeout: Duration,
}

impl QueryExecutor {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn timed<T>(
        &self,
        sql: &str,
        future: impl Future<Output = sqlgrid_core::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ServiceError::Timeout {
                seconds: self.timeout.as_secs(),
                sql: sql.to_string(),
            }),
        }
    }

    /// Runs the resolved `SELECT` and converts the result into rows.
    ///
    /// `max_rows` of `None` reads everything. When the result has a
    /// different number of columns than the statement projects, the
    /// projections are rebuilt from the result column names.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter is missing, the statement fails or
    /// the timeout elapses.
    pub async fn query(
        &self,
        dialect: &dyn Dialect,
        schema: Option<&SchemaSnapshot>,
        session: &mut dyn DatabaseSession,
        resolution: &mut SelectResolution,
        max_rows: Option<usize>,
        source: Option<ParameterSource<'_>>,
    ) -> Result<QueryResult> {
        let statement = bind_parameters(dialect, resolution.script(), source)?;
        let result = self
            .timed(&statement.sql, session.query(&statement, max_rows))
            .await?;

        if result.columns.len() != resolution.columns().len() {
            let names: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
            debug!(
                projected = resolution.columns().len(),
                returned = names.len(),
                "Rebuilding projections from result"
            );
            resolution.refresh_columns(schema, &names);
        }

        let columns = resolution.columns();
        let data = result
            .rows
            .into_iter()
            .map(|values| {
                let mut row = Row::new();
                for (column, value) in columns.iter().zip(values) {
                    row.set(
                        column.internal_field_name.clone(),
                        dialect.convert_from_storage(value, column.value_type),
                    );
                }
                row
            })
            .collect::<Vec<_>>();
        debug!(rows = data.len(), has_more_rows = result.has_more_rows, "Query finished");

        Ok(QueryResult {
            data,
            has_more_rows: result.has_more_rows,
        })
    }

    /// Runs a statement that returns no rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter is missing, the statement fails or
    /// the timeout elapses.
    pub async fn non_query(
        &self,
        dialect: &dyn Dialect,
        session: &mut dyn DatabaseSession,
        script: &str,
        source: Option<ParameterSource<'_>>,
    ) -> Result<u64> {
        let statement = bind_parameters(dialect, script, source)?;
        self.execute(session, &statement).await
    }

    async fn execute(
        &self,
        session: &mut dyn DatabaseSession,
        statement: &SynthesizedStatement,
    ) -> Result<u64> {
        let affected = self
            .timed(&statement.sql, session.execute(statement))
            .await?;
        debug!(affected, "Statement executed");
        Ok(affected)
    }

    /// Writes a batch of rows back to the save table. Returns the number
    /// of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement cannot be built or fails. Earlier
    /// statements stay applied on the session.
    pub async fn save(
        &self,
        dialect: &dyn Dialect,
        session: &mut dyn DatabaseSession,
        resolution: &SelectResolution,
        rows: &[Row],
    ) -> Result<u64> {
        let plan = plan_save(dialect, resolution, rows)?;
        let mut changed = 0;
        for (action, statement) in &plan {
            let affected = self.execute(session, statement).await?;
            debug!(action = action_name(*action), affected, "Saved row");
            changed += affected;
        }
        Ok(changed)
    }
}

const fn action_name(action: SaveAction) -> &'static str {
    match action {
        SaveAction::Insert => "insert",
        SaveAction::Update => "update",
        SaveAction::Delete => "delete",
    }
}

/// `SELECT` of every column of a table, optionally filtered on one column.
///
/// Column names go through the dialect's quoting and get the alias as
/// qualifier. The filter value is inlined as a literal.
#[must_use]
pub fn create_select(
    schema: &SchemaSnapshot,
    dialect: &dyn Dialect,
    table_name: &str,
    alias: Option<&str>,
    filter: Option<(&str, &Value)>,
) -> String {
    let alias = alias.filter(|a| !a.is_empty());
    let qualify = |column: &str| match alias {
        Some(alias) => format!("{alias}.{column}"),
        None => column.to_string(),
    };

    let columns: Vec<String> = schema
        .get_columns(table_name)
        .map(|c| qualify(&dialect.safe_column_name(&c.column_name)))
        .collect();
    let mut sql = format!("SELECT {} FROM {table_name}", columns.join(", "));
    if let Some(alias) = alias {
        sql.push(' ');
        sql.push_str(alias);
    }

    let mut sql = format_statement(&sql, SqlFormatRule::AllColumnsInOneLine);
    if let Some((column, value)) = filter {
        sql.push_str(&format!(
            " WHERE {} = {}",
            qualify(&dialect.safe_column_name(column)),
            literal(value)
        ));
    }
    sql
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => String::from("NULL"),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}
