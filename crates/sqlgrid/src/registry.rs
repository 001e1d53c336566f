//! Registry of configured databases, backed by the settings repository.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::database::{DatabaseInfo, DatabaseRecord};
use crate::error::{Result, ServiceError};
use crate::providers::ProviderRegistry;
use crate::repository::{ItemType, Repository, RepositoryItem};

/// All registered databases by id.
pub struct DatabaseRegistry {
    providers: Arc<ProviderRegistry>,
    repository: Arc<dyn Repository>,
    databases: RwLock<HashMap<i32, Entry>>,
}

struct Entry {
    info: Arc<DatabaseInfo>,
    record: DatabaseRecord,
    item_id: String,
}

impl std::fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("providers", &self.providers)
            .field("databases", &self.records().len())
            .finish_non_exhaustive()
    }
}

impl DatabaseRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(providers: Arc<ProviderRegistry>, repository: Arc<dyn Repository>) -> Self {
        Self {
            providers,
            repository,
            databases: RwLock::new(HashMap::new()),
        }
    }

    /// Loads every stored database record.
    ///
    /// Records naming an unknown provider or holding unreadable data are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read.
    pub async fn initialize(&self) -> Result<()> {
        let items = self.repository.load(ItemType::Database).await?;
        let mut loaded = HashMap::new();
        for item in items {
            let record: DatabaseRecord = match serde_json::from_str(&item.data) {
                Ok(record) => record,
                Err(e) => {
                    warn!(item = %item.id, error = %e, "Skipping unreadable database record");
                    continue;
                }
            };
            let provider = match self.providers.get(&record.provider_name) {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(database = record.id, error = %e, "Skipping database record");
                    continue;
                }
            };
            let info = DatabaseInfo::new(
                record.id,
                provider,
                record.caption.clone(),
                record.connection_string.clone(),
            );
            loaded.insert(
                record.id,
                Entry {
                    info: Arc::new(info),
                    record,
                    item_id: item.id,
                },
            );
        }
        info!(databases = loaded.len(), "Loaded database registry");
        *self.write() = loaded;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<i32, Entry>> {
        self.databases.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<i32, Entry>> {
        self.databases.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks a database up by id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownDatabase`] if the id is not registered.
    pub fn get(&self, id: i32) -> Result<Arc<DatabaseInfo>> {
        self.read()
            .get(&id)
            .map(|entry| Arc::clone(&entry.info))
            .ok_or(ServiceError::UnknownDatabase(id))
    }

    /// All records, ordered by caption.
    #[must_use]
    pub fn records(&self) -> Vec<DatabaseRecord> {
        let mut records: Vec<DatabaseRecord> =
            self.read().values().map(|entry| entry.record.clone()).collect();
        records.sort_by(|a, b| a.caption.cmp(&b.caption).then(a.id.cmp(&b.id)));
        records
    }

    /// Stores a record and registers or updates its database.
    ///
    /// A record with id 0 gets the next free id (largest id + 1). A new id is
    /// reserved in the registry before the repository write and released if
    /// that write fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown or the repository write
    /// fails.
    pub async fn add_or_update(&self, mut record: DatabaseRecord) -> Result<DatabaseRecord> {
        let provider = self.providers.get(&record.provider_name)?;

        let (info, stored_item) = {
            let mut databases = self.write();
            if record.id == 0 {
                record.id = databases.keys().max().map_or(1, |max| max + 1);
            }
            match databases.entry(record.id) {
                MapEntry::Occupied(entry) => {
                    let entry = entry.get();
                    (Arc::clone(&entry.info), Some(entry.item_id.clone()))
                }
                MapEntry::Vacant(slot) => {
                    let info = Arc::new(DatabaseInfo::new(
                        record.id,
                        Arc::clone(&provider),
                        record.caption.clone(),
                        record.connection_string.clone(),
                    ));
                    slot.insert(Entry {
                        info: Arc::clone(&info),
                        record: record.clone(),
                        item_id: String::new(),
                    });
                    (info, None)
                }
            }
        };

        let saved: Result<String> = async {
            let mut item = RepositoryItem::new(
                ItemType::Database,
                record.caption.clone(),
                serde_json::to_string(&record)?,
            );
            if let Some(item_id) = &stored_item {
                item.id.clone_from(item_id);
            }
            self.repository.save(item).await
        }
        .await;
        let item_id = match saved {
            Ok(item_id) => item_id,
            Err(e) => {
                if stored_item.is_none() {
                    self.write().remove(&record.id);
                }
                return Err(e);
            }
        };

        if stored_item.is_some() {
            info.update(
                provider,
                record.caption.clone(),
                record.connection_string.clone(),
            )
            .await;
            debug!(database = record.id, "Updated database");
        } else {
            info!(database = record.id, caption = %record.caption, "Added database");
        }
        self.write().insert(
            record.id,
            Entry {
                info,
                record: record.clone(),
                item_id,
            },
        );
        Ok(record)
    }

    /// Removes a database and marks its record deleted.
    ///
    /// Returns false if the id was not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository write fails.
    pub async fn remove(&self, id: i32) -> Result<bool> {
        let removed = self.write().remove(&id);
        let Some(entry) = removed else {
            return Ok(false);
        };
        if !entry.item_id.is_empty() {
            self.repository.delete(&entry.item_id).await?;
        }
        entry.info.close().await;
        info!(database = id, "Removed database");
        Ok(true)
    }

    /// Registers a database that is not persisted.
    pub fn insert_info(&self, info: Arc<DatabaseInfo>) {
        let record = DatabaseRecord {
            id: info.id(),
            caption: info.caption(),
            provider_name: info.provider().name().to_string(),
            connection_string: String::new(),
        };
        self.write().insert(
            record.id,
            Entry {
                info,
                record,
                item_id: String::new(),
            },
        );
    }
}
