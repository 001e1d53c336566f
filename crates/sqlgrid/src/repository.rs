//! Persistent settings: the `SETTINGS` bookkeeping table.
//!
//! Items are typed JSON documents. Deletes only set `IS_DELETED`, so a
//! removed item stays in the table but is never loaded again.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, NaiveDateTime};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sqlgrid_core::convert::parse_date_time;
use sqlgrid_core::provider::{DatabasePool, DatabaseProvider, Dialect};
use sqlgrid_core::schema::{Column, ValueType};
use sqlgrid_core::synth::{BoundParameter, SynthesizedStatement};
use sqlgrid_core::value::SqlValue;
use tracing::{debug, info};

use crate::config::split_provider;
use crate::error::{Result, ServiceError};
use crate::providers::ProviderRegistry;

/// Name of the bookkeeping table.
pub const SETTINGS_TABLE: &str = "SETTINGS";

const COLUMNS: [&str; 8] = [
    "ID",
    "TYPE",
    "NAME",
    "DATA",
    "CREATION_DATE",
    "CREATOR",
    "MODIFICATION_DATE",
    "MODIFIER",
];

/// Kind of a repository item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    /// A [`DatabaseRecord`](crate::database::DatabaseRecord).
    Database,
}

impl ItemType {
    const fn code(self) -> i64 {
        match self {
            Self::Database => 0,
        }
    }

    const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Database),
            _ => None,
        }
    }
}

/// One stored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryItem {
    /// 64-character hex id; empty for an item that was never saved.
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub name: String,
    /// JSON document.
    pub data: String,
    pub creation_date: Option<NaiveDateTime>,
    pub creator: String,
    pub modification_date: Option<NaiveDateTime>,
    pub modifier: String,
}

impl RepositoryItem {
    /// A new, unsaved item.
    #[must_use]
    pub fn new(item_type: ItemType, name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            item_type,
            name: name.into(),
            data: data.into(),
            creation_date: None,
            creator: String::new(),
            modification_date: None,
            modifier: String::new(),
        }
    }
}

/// Storage for repository items.
pub trait Repository: Send + Sync {
    /// Loads every item of a type that is not deleted.
    fn load(&self, item_type: ItemType) -> BoxFuture<'_, Result<Vec<RepositoryItem>>>;

    /// Inserts an item without id, updates one with id. Returns the id.
    fn save(&self, item: RepositoryItem) -> BoxFuture<'_, Result<String>>;

    /// Marks an item deleted.
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// 64-character hex id from 32 random bytes.
pub(crate) fn generate_id() -> String {
    use rand::RngExt;
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Repository backed by the `SETTINGS` table of any provider.
pub struct SettingsRepository {
    provider: Arc<dyn DatabaseProvider>,
    pool: Arc<dyn DatabasePool>,
    user: String,
}

impl SettingsRepository {
    /// Opens the repository database and creates the table if needed.
    ///
    /// `connection_string` is `ProviderName=<name>;<provider connection string>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown, the database cannot be
    /// opened or the table cannot be created.
    pub async fn connect(
        providers: &ProviderRegistry,
        connection_string: &str,
        user: impl Into<String>,
    ) -> Result<Self> {
        let (provider_name, connection_string) = split_provider(connection_string)?;
        let provider = providers.get(&provider_name)?;
        let pool = provider.connect(&connection_string).await?;
        Self::open(provider, pool, user).await
    }

    /// Uses an already open pool and creates the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created.
    pub async fn open(
        provider: Arc<dyn DatabaseProvider>,
        pool: Arc<dyn DatabasePool>,
        user: impl Into<String>,
    ) -> Result<Self> {
        if pool
            .create_table_if_not_exists(SETTINGS_TABLE, &settings_columns())
            .await?
        {
            info!(table = SETTINGS_TABLE, "Created settings table");
        }
        Ok(Self {
            provider,
            pool,
            user: user.into(),
        })
    }

    fn dialect(&self) -> &dyn Dialect {
        self.provider.dialect()
    }

    fn name(&self, identifier: &str) -> String {
        self.dialect().safe_column_name(identifier)
    }

    fn statement(&self, sql: String, values: Vec<SqlValue>) -> SynthesizedStatement {
        SynthesizedStatement {
            sql,
            params: values
                .into_iter()
                .enumerate()
                .map(|(i, v)| BoundParameter::new(i, v))
                .collect(),
        }
    }

    async fn execute(&self, statement: SynthesizedStatement) -> Result<u64> {
        let mut session = self.pool.begin().await?;
        let affected = session.execute(&statement).await?;
        session.commit().await?;
        Ok(affected)
    }

    async fn insert(&self, mut item: RepositoryItem) -> Result<String> {
        item.id = generate_id();
        let columns: Vec<String> = COLUMNS
            .iter()
            .chain(std::iter::once(&"IS_DELETED"))
            .map(|c| self.name(c))
            .collect();
        let placeholders: Vec<String> = (0..columns.len())
            .map(|i| self.dialect().placeholder(i))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name(SETTINGS_TABLE),
            columns.join(", "),
            placeholders.join(", ")
        );
        let stamp = now();
        let values = vec![
            SqlValue::Text(item.id.clone()),
            SqlValue::Int(item.item_type.code()),
            SqlValue::Text(item.name),
            SqlValue::Text(item.data),
            SqlValue::DateTime(stamp),
            SqlValue::Text(self.user.clone()),
            SqlValue::DateTime(stamp),
            SqlValue::Text(self.user.clone()),
            SqlValue::Bool(false),
        ];
        self.execute(self.statement(sql, values)).await?;
        debug!(id = %item.id, "Inserted repository item");
        Ok(item.id)
    }

    async fn update(&self, item: RepositoryItem) -> Result<String> {
        let p = |i| self.dialect().placeholder(i);
        let sql = format!(
            "UPDATE {} SET {} = {}, {} = {}, {} = {}, {} = {} WHERE {} = {}",
            self.name(SETTINGS_TABLE),
            self.name("NAME"),
            p(0),
            self.name("DATA"),
            p(1),
            self.name("MODIFICATION_DATE"),
            p(2),
            self.name("MODIFIER"),
            p(3),
            self.name("ID"),
            p(4),
        );
        let values = vec![
            SqlValue::Text(item.name),
            SqlValue::Text(item.data),
            SqlValue::DateTime(now()),
            SqlValue::Text(self.user.clone()),
            SqlValue::Text(item.id.clone()),
        ];
        self.execute(self.statement(sql, values)).await?;
        debug!(id = %item.id, "Updated repository item");
        Ok(item.id)
    }
}

/// Column layout of the `SETTINGS` table.
#[must_use]
pub fn settings_columns() -> Vec<Column> {
    let column = |name: &str, value_type| Column::new(SETTINGS_TABLE, name, value_type).not_null();
    vec![
        column("ID", ValueType::Text).max_length(64),
        column("TYPE", ValueType::Integer),
        column("NAME", ValueType::Text).max_length(100),
        column("DATA", ValueType::Text),
        column("IS_DELETED", ValueType::Boolean),
        column("CREATION_DATE", ValueType::DateTime),
        column("CREATOR", ValueType::Text).max_length(50),
        column("MODIFICATION_DATE", ValueType::DateTime),
        column("MODIFIER", ValueType::Text).max_length(50),
    ]
}

fn text(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Text(s) | SqlValue::Decimal(s) => s.clone(),
        other => other.to_sql_inline(),
    }
}

fn date_time(value: &SqlValue) -> Option<NaiveDateTime> {
    match value {
        SqlValue::DateTime(dt) => Some(*dt),
        SqlValue::Date(d) => d.and_hms_opt(0, 0, 0),
        SqlValue::Text(s) => parse_date_time(s),
        _ => None,
    }
}

fn item_from_row(row: &[SqlValue]) -> Result<RepositoryItem> {
    let [id, kind, name, data, created, creator, modified, modifier] = row else {
        return Err(ServiceError::Repository(format!(
            "expected {} columns, got {}",
            COLUMNS.len(),
            row.len()
        )));
    };
    let item_type = match kind {
        SqlValue::Int(code) => ItemType::from_code(*code),
        _ => None,
    }
    .ok_or_else(|| ServiceError::Repository(format!("unknown item type {}", text(kind))))?;
    Ok(RepositoryItem {
        id: text(id),
        item_type,
        name: text(name),
        data: text(data),
        creation_date: date_time(created),
        creator: text(creator),
        modification_date: date_time(modified),
        modifier: text(modifier),
    })
}

impl Repository for SettingsRepository {
    fn load(&self, item_type: ItemType) -> BoxFuture<'_, Result<Vec<RepositoryItem>>> {
        Box::pin(async move {
            let columns: Vec<String> = COLUMNS.iter().map(|c| self.name(c)).collect();
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = {} AND {} = {}",
                columns.join(", "),
                self.name(SETTINGS_TABLE),
                self.name("IS_DELETED"),
                self.dialect().placeholder(0),
                self.name("TYPE"),
                self.dialect().placeholder(1),
            );
            let statement = self.statement(
                sql,
                vec![SqlValue::Bool(false), SqlValue::Int(item_type.code())],
            );
            let mut session = self.pool.begin().await?;
            let result = session.query(&statement, None).await?;
            session.rollback().await?;
            result.rows.iter().map(|row| item_from_row(row)).collect()
        })
    }

    fn save(&self, item: RepositoryItem) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if item.id.is_empty() {
                self.insert(item).await
            } else {
                self.update(item).await
            }
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE {} SET {} = {} WHERE {} = {}",
                self.name(SETTINGS_TABLE),
                self.name("IS_DELETED"),
                self.dialect().placeholder(0),
                self.name("ID"),
                self.dialect().placeholder(1),
            );
            let statement =
                self.statement(sql, vec![SqlValue::Bool(true), SqlValue::Text(id.to_string())]);
            self.execute(statement).await?;
            debug!(id, "Deleted repository item");
            Ok(())
        })
    }
}

/// Repository kept in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    items: Mutex<Vec<(RepositoryItem, bool)>>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for MemoryRepository {
    fn load(&self, item_type: ItemType) -> BoxFuture<'_, Result<Vec<RepositoryItem>>> {
        let items: Vec<RepositoryItem> = self
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(item, deleted)| !deleted && item.item_type == item_type)
            .map(|(item, _)| item.clone())
            .collect();
        Box::pin(async move { Ok(items) })
    }

    fn save(&self, mut item: RepositoryItem) -> BoxFuture<'_, Result<String>> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let stamp = Some(now());
        item.modification_date = stamp;
        let id = match items.iter_mut().find(|(stored, _)| stored.id == item.id && !item.id.is_empty()) {
            Some((stored, _)) => {
                stored.name = item.name;
                stored.data = item.data;
                stored.modification_date = stamp;
                stored.id.clone()
            }
            None => {
                item.id = generate_id();
                item.creation_date = stamp;
                let id = item.id.clone();
                items.push((item, false));
                id
            }
        };
        Box::pin(async move { Ok(id) })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        for (item, deleted) in items.iter_mut() {
            if item.id == id {
                *deleted = true;
            }
        }
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_memory_repository() {
        let repository = MemoryRepository::new();
        let id = repository
            .save(RepositoryItem::new(ItemType::Database, "a", "{}"))
            .await
            .unwrap();

        let mut item = repository.load(ItemType::Database).await.unwrap().remove(0);
        assert_eq!(item.id, id);
        item.data = String::from("{\"x\":1}");
        assert_eq!(repository.save(item).await.unwrap(), id);
        assert_eq!(repository.load(ItemType::Database).await.unwrap()[0].data, "{\"x\":1}");

        repository.delete(&id).await.unwrap();
        assert!(repository.load(ItemType::Database).await.unwrap().is_empty());
    }

    #[test]
    fn test_item_from_row() {
        let row = vec![
            SqlValue::Text("ab".into()),
            SqlValue::Int(0),
            SqlValue::Text("main".into()),
            SqlValue::Text("{}".into()),
            SqlValue::Text("2024-03-05 10:00:00".into()),
            SqlValue::Text("me".into()),
            SqlValue::Null,
            SqlValue::Text("me".into()),
        ];
        let item = item_from_row(&row).unwrap();
        assert_eq!(item.item_type, ItemType::Database);
        assert_eq!(
            item.creation_date.unwrap().to_string(),
            "2024-03-05 10:00:00"
        );
        assert_eq!(item.modification_date, None);
        assert!(item_from_row(&row[..3]).is_err());
    }
}
