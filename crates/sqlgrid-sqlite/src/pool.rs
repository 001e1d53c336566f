//! Pool and session implementations.

use futures::future::BoxFuture;
use futures::TryStreamExt;
use sqlgrid_core::error::{GridError, Result};
use sqlgrid_core::provider::{DatabasePool, DatabaseSession, Dialect, ResultColumn, ResultSet};
use sqlgrid_core::schema::{Column, Relation, Table};
use sqlgrid_core::synth::SynthesizedStatement;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{Column as _, Executor, Statement, Transaction, TypeInfo};
use tracing::{debug, info};

use crate::dialect::SqliteProvider;
use crate::introspect;
use crate::values::{bind_all, decode_row};

/// An open SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    dialect: SqliteProvider,
}

impl SqliteDatabase {
    /// Wraps an existing `sqlx` pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            dialect: SqliteProvider,
        }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl DatabasePool for SqliteDatabase {
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn DatabaseSession>>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(GridError::database)?;
            Ok(Box::new(SqliteSession { tx }) as Box<dyn DatabaseSession>)
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

/// A transaction on one pooled connection.
pub struct SqliteSession {
    tx: Transaction<'static, Sqlite>,
}

impl DatabaseSession for SqliteSession {
    fn query<'a>(
        &'a mut self,
        statement: &'a SynthesizedStatement,
        max_rows: Option<usize>,
    ) -> BoxFuture<'a, Result<ResultSet>> {
        Box::pin(async move {
            let sql = statement.sql.as_str();
            debug!(sql, params = statement.params.len(), "Running query");
            let prepared = (&mut *self.tx)
                .prepare(sql)
                .await
                .map_err(|e| GridError::execution(e, sql))?;
            let columns: Vec<ResultColumn> = prepared
                .columns()
                .iter()
                .map(|c| ResultColumn {
                    name: c.name().to_string(),
                    type_name: c.type_info().name().to_string(),
                })
                .collect();

            let query = bind_all(prepared.query(), &statement.params);
            let mut stream = query.fetch(&mut *self.tx);
            let mut result = ResultSet {
                columns,
                ..ResultSet::default()
            };
            while let Some(row) = stream
                .try_next()
                .await
                .map_err(|e| GridError::execution(e, sql))?
            {
                if max_rows.is_some_and(|max| result.rows.len() >= max) {
                    result.has_more_rows = true;
                    break;
                }
                result.rows.push(decode_row(&row)?);
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
            let done = bind_all(sqlx::query(sql), &statement.params)
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
