//! Pool and session implementations.

use futures::future::BoxFuture;
use futures::TryStreamExt;
use sqlgrid_core::error::{GridError, Result};
use sqlgrid_core::provider::{DatabasePool, DatabaseSession, Dialect, ResultColumn, ResultSet};
use sqlgrid_core::schema::{Column, Relation, Table};
use sqlgrid_core::synth::SynthesizedStatement;
use sqlx::postgres::{PgColumn, PgPool, Postgres};
use sqlx::{Column as _, Executor, Row, Transaction, TypeInfo};
use tracing::{debug, info};

use crate::dialect::PostgresProvider;
use crate::introspect;
use crate::values::{bind_all, decode_row};

/// An open PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
    dialect: PostgresProvider,
}

impl PostgresDatabase {
    /// Wraps an existing `sqlx` pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            pool,
            dialect: PostgresProvider,
        }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DatabasePool for PostgresDatabase {
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn DatabaseSession>>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(GridError::database)?;
            Ok(Box::new(PostgresSession { tx }) as Box<dyn DatabaseSession>)
        })
    }

    fn tables(&self) -> BoxFuture<'_, Result<Vec<Table>>> {
        Box::pin(introspect::tables(&self.pool))
    }

    fn columns(&self) -> BoxFuture<'_, Result<Vec<Column>>> {
        Box::pin(introspect::columns(&self.pool, &self.dialect))
    }

    fn relations(&self) -> BoxFuture<'_, Result<Vec<Relation>>> {
        Box::pin(introspect::relations(&self.pool))
    }

    fn create_table_if_not_exists<'a>(
        &'a self,
        table_name: &'a str,
        columns: &'a [Column],
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            if introspect::table_exists(&self.pool, table_name).await? {
                return Ok(false);
            }
            let sql = self.dialect.create_table_sql(table_name, columns);
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| GridError::execution(e, &sql))?;
            info!(table = table_name, "Created table");
            Ok(true)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.pool.close())
    }
}

fn result_columns(columns: &[PgColumn]) -> Vec<ResultColumn> {
    columns
        .iter()
        .map(|c| ResultColumn {
            name: c.name().to_string(),
            type_name: c.type_info().name().to_string(),
        })
        .collect()
}

/// A transaction on one pooled connection.
pub struct PostgresSession {
    tx: Transaction<'static, Postgres>,
}

impl DatabaseSession for PostgresSession {
    fn query<'a>(
        &'a mut self,
        statement: &'a SynthesizedStatement,
        max_rows: Option<usize>,
    ) -> BoxFuture<'a, Result<ResultSet>> {
        Box::pin(async move {
            let sql = statement.sql.as_str();
            debug!(sql, params = statement.params.len(), "Running query");
            // Not prepared up front: parameter types must come from the
            // bound values, not from server inference.
            let query = bind_all(sqlx::query(sql), &statement.params)?;
            let mut result = ResultSet::default();
            {
                let mut stream = query.fetch(&mut *self.tx);
                while let Some(row) = stream
                    .try_next()
                    .await
                    .map_err(|e| GridError::execution(e, sql))?
                {
                    if result.columns.is_empty() {
                        result.columns = result_columns(row.columns());
                    }
                    if max_rows.is_some_and(|max| result.rows.len() >= max) {
                        result.has_more_rows = true;
                        break;
                    }
                    result.rows.push(decode_row(&row)?);
                }
            }
            if result.rows.is_empty() {
                match (&mut *self.tx).describe(sql).await {
                    Ok(described) => result.columns = result_columns(described.columns()),
                    Err(e) => debug!(sql, error = %e, "Could not describe empty result"),
                }
            }
            Ok(result)
        })
    }

    fn execute<'a>(
        &'a mut self,
        statement: &'a SynthesizedStatement,
    ) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let sql = statement.sql.as_str();
            debug!(sql, params = statement.params.len(), "Executing statement");
            let done = bind_all(sqlx::query(sql), &statement.params)?
                .execute(&mut *self.tx)
                .await
                .map_err(|e| GridError::execution(e, sql))?;
            Ok(done.rows_affected())
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move { self.tx.commit().await.map_err(GridError::database) })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move { self.tx.rollback().await.map_err(GridError::database) })
    }
}
