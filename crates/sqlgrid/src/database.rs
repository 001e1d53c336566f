//! One configured database: its provider, a lazily opened pool and a
//! lazily built schema snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use sqlgrid_core::provider::{DatabasePool, DatabaseProvider};
use sqlgrid_core::schema::SchemaSnapshot;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;

/// Persisted description of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseRecord {
    /// Registry id; 0 for a record that was never saved.
    #[serde(default)]
    pub id: i32,
    /// Display name.
    pub caption: String,
    /// Provider name, e.g. `sqlite` or `postgres`.
    pub provider_name: String,
    /// Provider-specific connection string.
    pub connection_string: String,
}

#[derive(Clone)]
struct Target {
    provider: Arc<dyn DatabaseProvider>,
    caption: String,
    connection_string: String,
}

/// A registered database.
///
/// The pool and the schema snapshot are built on first use. Both are
/// published through a read lock, so readers never wait for a rebuild
/// and never see a partial snapshot.
pub struct DatabaseInfo {
    id: i32,
    target: RwLock<Target>,
    pool: RwLock<Option<Arc<dyn DatabasePool>>>,
    schema: RwLock<Option<Arc<SchemaSnapshot>>>,
    build: Mutex<()>,
}

impl std::fmt::Debug for DatabaseInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = self.target();
        f.debug_struct("DatabaseInfo")
            .field("id", &self.id)
            .field("provider", &target.provider.name())
            .field("caption", &target.caption)
            .finish_non_exhaustive()
    }
}

impl DatabaseInfo {
    /// Creates an entry without connecting.
    #[must_use]
    pub fn new(
        id: i32,
        provider: Arc<dyn DatabaseProvider>,
        caption: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            id,
            target: RwLock::new(Target {
                provider,
                caption: caption.into(),
                connection_string: connection_string.into(),
            }),
            pool: RwLock::new(None),
            schema: RwLock::new(None),
            build: Mutex::new(()),
        }
    }

    /// Creates an entry around an already open pool.
    #[must_use]
    pub fn with_pool(
        id: i32,
        provider: Arc<dyn DatabaseProvider>,
        caption: impl Into<String>,
        pool: Arc<dyn DatabasePool>,
    ) -> Self {
        let info = Self::new(id, provider, caption, String::new());
        *info.pool.write().unwrap_or_else(PoisonError::into_inner) = Some(pool);
        info
    }

    fn target(&self) -> Target {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub const fn id(&self) -> i32 {
        self.id
    }

    #[must_use]
    pub fn caption(&self) -> String {
        self.target().caption
    }

    /// The engine provider; also the dialect for statement text.
    #[must_use]
    pub fn provider(&self) -> Arc<dyn DatabaseProvider> {
        self.target().provider
    }

    /// Returns the connection pool, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is invalid or the
    /// database cannot be reached.
    pub async fn pool(&self) -> Result<Arc<dyn DatabasePool>> {
        if let Some(pool) = self.published_pool() {
            return Ok(pool);
        }
        let _guard = self.build.lock().await;
        if let Some(pool) = self.published_pool() {
            return Ok(pool);
        }

        let target = self.target();
        let pool = target.provider.connect(&target.connection_string).await?;
        info!(database = self.id, provider = target.provider.name(), "Connected");
        *self.pool.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&pool));
        Ok(pool)
    }

    fn published_pool(&self) -> Option<Arc<dyn DatabasePool>> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the schema snapshot, reading the catalog on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be opened or a catalog query
    /// fails. Nothing is cached in that case.
    pub async fn schema(&self) -> Result<Arc<SchemaSnapshot>> {
        if let Some(schema) = self.published_schema() {
            return Ok(schema);
        }
        let pool = self.pool().await?;
        let _guard = self.build.lock().await;
        if let Some(schema) = self.published_schema() {
            return Ok(schema);
        }

        let tables = pool.tables().await?;
        let columns = pool.columns().await?;
        let relations = pool.relations().await?;
        debug!(
            database = self.id,
            tables = tables.len(),
            columns = columns.len(),
            relations = relations.len(),
            "Read schema"
        );
        let schema = Arc::new(SchemaSnapshot::new(tables, columns, relations));
        *self.schema.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&schema));
        Ok(schema)
    }

    fn published_schema(&self) -> Option<Arc<SchemaSnapshot>> {
        self.schema
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drops the schema snapshot; the next access reads the catalog again.
    pub fn invalidate_schema(&self) {
        *self.schema.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Replaces provider, caption and connection string.
    ///
    /// When the provider or connection string changes, the pool is closed
    /// and the schema snapshot dropped.
    pub async fn update(
        &self,
        provider: Arc<dyn DatabaseProvider>,
        caption: impl Into<String>,
        connection_string: impl Into<String>,
    ) {
        let connection_string = connection_string.into();
        let _guard = self.build.lock().await;
        let changed = {
            let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
            let changed = target.provider.name() != provider.name()
                || target.connection_string != connection_string;
            *target = Target {
                provider,
                caption: caption.into(),
                connection_string,
            };
            changed
        };
        if changed {
            self.invalidate_schema();
            let old = self.pool.write().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(pool) = old {
                pool.close().await;
            }
            info!(database = self.id, "Connection changed; schema cleared");
        }
    }

    /// Closes the pool if it was opened.
    pub async fn close(&self) {
        let old = self.pool.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pool) = old {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgrid_sqlite::SqliteProvider;

    fn sqlite() -> Arc<dyn DatabaseProvider> {
        Arc::new(SqliteProvider::new())
    }

    #[tokio::test]
    async fn test_schema_is_cached_until_invalidated() {
        let info = DatabaseInfo::new(1, sqlite(), "mem", "sqlite::memory:");
        let first = info.schema().await.unwrap();
        let second = info.schema().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        info.invalidate_schema();
        let third = info.schema().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_update_reconnects_only_on_connection_change() {
        let info = DatabaseInfo::new(1, sqlite(), "mem", "sqlite::memory:");
        let pool = info.pool().await.unwrap();

        info.update(sqlite(), "renamed", "sqlite::memory:").await;
        assert_eq!(info.caption(), "renamed");
        assert!(Arc::ptr_eq(&pool, &info.pool().await.unwrap()));

        info.update(sqlite(), "renamed", "Data Source=:memory:").await;
        assert!(!Arc::ptr_eq(&pool, &info.pool().await.unwrap()));
    }
}
