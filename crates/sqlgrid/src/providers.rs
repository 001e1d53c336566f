//! Registry of database providers by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use sqlgrid_core::error::GridError;
use sqlgrid_core::provider::DatabaseProvider;
use sqlgrid_postgres::PostgresProvider;
use sqlgrid_sqlite::SqliteProvider;

use crate::error::Result;

/// Public description of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Name used in connection strings and database records.
    pub name: String,
    /// Parameter marker of the provider's dialect.
    pub parameter_prefix: String,
}

/// Providers keyed by lower-cased name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn DatabaseProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}

impl ProviderRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the SQLite and PostgreSQL providers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SqliteProvider::new()));
        registry.register(Arc::new(PostgresProvider::new()));
        registry
    }

    /// Adds a provider, replacing one with the same name.
    pub fn register(&mut self, provider: Arc<dyn DatabaseProvider>) {
        self.providers
            .insert(provider.name().to_lowercase(), provider);
    }

    /// Looks a provider up, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::UnknownProvider`] if nothing is registered
    /// under the name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn DatabaseProvider>> {
        self.providers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| GridError::UnknownProvider(name.to_string()).into())
    }

    /// Descriptions of every provider, ordered by name.
    #[must_use]
    pub fn infos(&self) -> Vec<ProviderInfo> {
        self.providers
            .values()
            .map(|p| ProviderInfo {
                name: p.name().to_string(),
                parameter_prefix: p.parameter_prefix().to_string(),
            })
            .collect()
    }
}
