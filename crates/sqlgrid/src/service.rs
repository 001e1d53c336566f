//! Request/response facade over registry, executor, change data and the
//! transaction pool.
//!
//! Every entry point takes a deserialized request and returns a
//! serializable response. [`ApiResponse`] turns failures into
//! `{"exception": message}` for transports that cannot carry errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlgrid_core::format::{format_statement, SqlFormatRule};
use sqlgrid_core::param::ParameterSource;
use sqlgrid_core::provider::DatabaseSession;
use sqlgrid_core::resolve::{ColumnProjection, SelectResolution};
use sqlgrid_core::row::Row;
use sqlgrid_core::schema::{Column, SchemaSnapshot, Table};
use sqlgrid_core::segment::{statement_at, ScriptType};
use sqlgrid_expr::ScriptCache;
use tracing::{debug, info, warn};

use crate::change_data::{ChangeDataPipeline, ChangeDataResult, ChangeRule};
use crate::config::Settings;
use crate::database::{DatabaseInfo, DatabaseRecord};
use crate::error::{Result, ServiceError};
use crate::executor::{create_select, QueryExecutor, QueryResult};
use crate::providers::{ProviderInfo, ProviderRegistry};
use crate::registry::DatabaseRegistry;
use crate::repository::{Repository, SettingsRepository};
use crate::transactions::{TransactionOutcome, TransactionPool};

/// Grid request: a script or a table to select from, plus optional rows,
/// projections and change rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TableData {
    /// Client-side grid id, echoed back.
    pub table_id: i64,
    pub database_id: i32,
    /// Table to select from when `script` is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    /// Filter column for the generated select.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    /// Filter value for the generated select.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Row limit; absent uses the configured default, negative reads all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Projections the rows were read with.
    pub columns: Vec<ColumnProjection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_data: Option<Vec<ChangeRule>>,
    /// Parent grid whose rows parameterize this query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_table_data: Option<Box<TableData>>,
    pub script: String,
}

/// Echo of the executed grid request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTableData {
    pub table_id: i64,
    pub database_id: i32,
    pub rows: Option<i64>,
    pub script: String,
    pub columns: Vec<ColumnProjection>,
    /// `FROM` tables joined with `, `.
    pub tables: String,
    pub change_data: Option<Vec<ChangeRule>>,
    pub referenced_table_data: Option<Box<TableData>>,
}

/// Response to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub table_data: QueryTableData,
    /// Projections that may be written back.
    pub columns_save: Vec<ColumnProjection>,
    pub result: QueryResult,
}

/// Rows changed in a transaction that is kept open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedRows {
    pub changed_rows: u64,
    pub transaction_id: String,
}

/// Response to [`Service::execute`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecuteResponse {
    Query(Box<QueryResponse>),
    Changed(ChangedRows),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub transaction_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectSqlRequest {
    pub table_id: i64,
    pub database_id: i32,
    pub table_name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectTableData {
    pub table_id: i64,
    pub database_id: i32,
    pub script: String,
    pub tables: String,
}

/// Generated select for a table, with its projections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectSqlResponse {
    pub table_data: SelectTableData,
    pub columns: Vec<ColumnProjection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormatSqlRequest {
    pub script: String,
    pub rule: SqlFormatRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSqlResponse {
    pub script: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TableInfoRequest {
    pub database_id: i32,
    pub table_name: String,
}

/// Catalog entry of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfoResponse {
    pub table: Option<Table>,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Success payload or `{"exception": message}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Ok(T),
    Exception { exception: String },
}

impl<T> ApiResponse<T> {
    /// Wraps a result; errors keep only their message.
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) => {
                warn!(error = %e, "Request failed");
                Self::Exception {
                    exception: e.to_string(),
                }
            }
        }
    }
}

impl<T> From<Result<T>> for ApiResponse<T> {
    fn from(result: Result<T>) -> Self {
        Self::from_result(result)
    }
}

fn script_type(script: &str) -> ScriptType {
    statement_at(script, 0, 0).map_or(ScriptType::Unknown, |s| s.script_type)
}

fn table_list(resolution: &SelectResolution) -> String {
    resolution
        .tables()
        .iter()
        .map(|t| t.table_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

async fn discard(session: Box<dyn DatabaseSession>) {
    if let Err(e) = session.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}

/// The service: one instance per process.
pub struct Service {
    settings: Settings,
    providers: Arc<ProviderRegistry>,
    registry: DatabaseRegistry,
    transactions: Arc<TransactionPool>,
    scripts: ScriptCache,
    executor: QueryExecutor,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("transactions", &self.transactions)
            .finish_non_exhaustive()
    }
}

impl Service {
    /// Creates a service over a repository. Call [`Service::initialize`]
    /// before serving requests.
    #[must_use]
    pub fn new(
        settings: Settings,
        providers: ProviderRegistry,
        repository: Arc<dyn Repository>,
    ) -> Self {
        let providers = Arc::new(providers);
        Self {
            registry: DatabaseRegistry::new(Arc::clone(&providers), repository),
            transactions: Arc::new(TransactionPool::new(
                settings.transaction_ttl(),
                settings.sweep_interval(),
            )),
            scripts: ScriptCache::new(),
            executor: QueryExecutor::new(settings.command_timeout()),
            providers,
            settings,
        }
    }

    /// Opens the configured settings repository and initializes.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be opened or read.
    pub async fn start(settings: Settings) -> Result<Self> {
        let providers = ProviderRegistry::with_defaults();
        let repository =
            SettingsRepository::connect(&providers, &settings.repository, settings.user.clone())
                .await?;
        let service = Self::new(settings, providers, Arc::new(repository));
        service.initialize().await?;
        Ok(service)
    }

    /// Loads the database registry and starts the transaction sweeper.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read.
    pub async fn initialize(&self) -> Result<()> {
        self.registry.initialize().await?;
        self.transactions.start_sweeper();
        info!("Service initialized");
        Ok(())
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub const fn registry(&self) -> &DatabaseRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn transactions(&self) -> &Arc<TransactionPool> {
        &self.transactions
    }

    #[must_use]
    pub const fn scripts(&self) -> &ScriptCache {
        &self.scripts
    }

    fn row_limit(&self, rows: Option<i64>) -> Option<usize> {
        match rows {
            None => Some(self.settings.default_rows),
            Some(n) => usize::try_from(n).ok(),
        }
    }

    /// Runs the first statement of a request.
    ///
    /// An empty script with a table name selects the whole table, filtered
    /// on `columnName = value` when both are given. A query returns rows;
    /// a non-query that changed rows keeps its transaction open; anything
    /// else returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unknown or a statement fails.
    pub async fn execute(&self, mut request: TableData) -> Result<Option<ExecuteResponse>> {
        let database = self.registry.get(request.database_id)?;
        let schema = database.schema().await?;

        if request.script.trim().is_empty() {
            if let Some(table) = request.table_name.as_deref().filter(|t| !t.is_empty()) {
                let filter = match (&request.column_name, &request.value) {
                    (Some(column), Some(value)) if !column.is_empty() && !value.is_null() => {
                        Some((column.as_str(), value))
                    }
                    _ => None,
                };
                request.script = create_select(
                    &schema,
                    database.provider().dialect(),
                    table,
                    request.alias.as_deref(),
                    filter,
                );
            }
        }

        match script_type(&request.script) {
            ScriptType::Query => {
                let response = self.query(&database, &schema, request).await?;
                Ok(Some(ExecuteResponse::Query(Box::new(response))))
            }
            ScriptType::NonQuery => {
                let changed = self.non_query(&database, &request.script).await?;
                Ok(changed.map(ExecuteResponse::Changed))
            }
            _ => Ok(None),
        }
    }

    async fn query(
        &self,
        database: &DatabaseInfo,
        schema: &SchemaSnapshot,
        request: TableData,
    ) -> Result<QueryResponse> {
        let provider = database.provider();
        let dialect = provider.dialect();
        let mut resolution = SelectResolution::resolve(Some(schema), &request.script);
        let mut session = database.pool().await?.begin().await?;

        let result = match (&request.data, &request.referenced_table_data) {
            (Some(rows), Some(referenced)) => {
                let mut data = Vec::new();
                let mut failure = None;
                for row in rows {
                    let source = ParameterSource {
                        columns: &referenced.columns,
                        row,
                    };
                    match self
                        .executor
                        .query(dialect, Some(schema), session.as_mut(), &mut resolution, None, Some(source))
                        .await
                    {
                        Ok(result) => data.extend(result.data),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                match failure {
                    Some(e) => Err(e),
                    None => Ok(QueryResult {
                        data,
                        has_more_rows: false,
                    }),
                }
            }
            _ => {
                let limit = self.row_limit(request.rows);
                self.executor
                    .query(dialect, Some(schema), session.as_mut(), &mut resolution, limit, None)
                    .await
            }
        };
        discard(session).await;
        let result = result?;

        Ok(QueryResponse {
            table_data: QueryTableData {
                table_id: request.table_id,
                database_id: request.database_id,
                rows: request.rows,
                tables: table_list(&resolution),
                columns: resolution.columns().to_vec(),
                script: request.script,
                change_data: request.change_data,
                referenced_table_data: request.referenced_table_data,
            },
            columns_save: resolution.column_saves().to_vec(),
            result,
        })
    }

    async fn non_query(&self, database: &DatabaseInfo, script: &str) -> Result<Option<ChangedRows>> {
        let provider = database.provider();
        let mut session = database.pool().await?.begin().await?;
        let changed = match self
            .executor
            .non_query(provider.dialect(), session.as_mut(), script, None)
            .await
        {
            Ok(changed) => changed,
            Err(e) => {
                discard(session).await;
                return Err(e);
            }
        };

        if changed > 0 {
            let transaction_id = self.transactions.keep(vec![session], None);
            return Ok(Some(ChangedRows {
                changed_rows: changed,
                transaction_id,
            }));
        }
        // DDL reports no affected rows and must not be lost.
        session.commit().await?;
        database.invalidate_schema();
        debug!(database = database.id(), "Statement changed no rows; committed");
        Ok(None)
    }

    /// Applies change rules to the request's rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a rule fails.
    pub async fn execute_changes(&self, request: TableData) -> Result<ChangeDataResult> {
        let rules = request.change_data.unwrap_or_default();
        let rows = request.data.unwrap_or_default();
        ChangeDataPipeline::new(&self.registry, &self.executor, &self.scripts, &self.transactions)
            .run(rows, &request.columns, &rules)
            .await
    }

    /// Writes the request's rows back to the query's save table.
    ///
    /// Returns `None` when no row changed; otherwise the transaction is
    /// kept open for commit or rollback.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotAQuery`] if the script is not a `SELECT`,
    /// or an error if a statement fails.
    pub async fn save(&self, request: TableData) -> Result<Option<ChangedRows>> {
        if script_type(&request.script) != ScriptType::Query {
            return Err(ServiceError::NotAQuery);
        }
        let database = self.registry.get(request.database_id)?;
        let schema = database.schema().await?;
        let provider = database.provider();
        let resolution = SelectResolution::resolve(Some(&schema), &request.script);
        let rows = request.data.unwrap_or_default();

        let mut session = database.pool().await?.begin().await?;
        let changed = match self
            .executor
            .save(provider.dialect(), session.as_mut(), &resolution, &rows)
            .await
        {
            Ok(changed) => changed,
            Err(e) => {
                discard(session).await;
                return Err(e);
            }
        };

        if changed == 0 {
            discard(session).await;
            return Ok(None);
        }
        let transaction_id = self.transactions.keep(vec![session], None);
        info!(database = database.id(), changed, "Saved rows");
        Ok(Some(ChangedRows {
            changed_rows: changed,
            transaction_id,
        }))
    }

    /// Commits a kept transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a commit fails.
    pub async fn commit(&self, request: TransactionRequest) -> Result<TransactionOutcome> {
        self.transactions.commit(&request.transaction_id).await
    }

    /// Rolls a kept transaction back.
    pub async fn rollback(&self, request: TransactionRequest) -> TransactionOutcome {
        self.transactions.rollback(&request.transaction_id).await
    }

    /// Generated select for a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unknown or its schema cannot be
    /// read.
    pub async fn select_sql(&self, request: SelectSqlRequest) -> Result<SelectSqlResponse> {
        let database = self.registry.get(request.database_id)?;
        let schema = database.schema().await?;
        let script = create_select(
            &schema,
            database.provider().dialect(),
            &request.table_name,
            request.alias.as_deref(),
            None,
        );
        let resolution = SelectResolution::resolve(Some(&schema), &script);
        Ok(SelectSqlResponse {
            table_data: SelectTableData {
                table_id: request.table_id,
                database_id: request.database_id,
                tables: table_list(&resolution),
                script,
            },
            columns: resolution.columns().to_vec(),
        })
    }

    /// Reflows a statement.
    #[must_use]
    pub fn format_sql(&self, request: &FormatSqlRequest) -> FormatSqlResponse {
        FormatSqlResponse {
            script: format_statement(&request.script, request.rule),
        }
    }

    /// Catalog entry and columns of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unknown or its schema cannot be
    /// read.
    pub async fn table_info(&self, request: &TableInfoRequest) -> Result<TableInfoResponse> {
        let schema = self.registry.get(request.database_id)?.schema().await?;
        Ok(TableInfoResponse {
            table: schema.get_table(&request.table_name).cloned(),
            columns: schema.get_columns(&request.table_name).cloned().collect(),
        })
    }

    /// Tables of a database, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unknown or its schema cannot be
    /// read.
    pub async fn tables(&self, database_id: i32) -> Result<Vec<Table>> {
        let schema = self.registry.get(database_id)?.schema().await?;
        let mut tables = schema.tables().to_vec();
        tables.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(tables)
    }

    /// Registered databases, ordered by caption.
    #[must_use]
    pub fn databases(&self) -> Vec<DatabaseRecord> {
        self.registry.records()
    }

    /// Adds or updates a database record.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown or the record cannot be
    /// stored.
    pub async fn save_database(&self, record: DatabaseRecord) -> Result<DatabaseRecord> {
        self.registry.add_or_update(record).await
    }

    /// Removes a database.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository write fails.
    pub async fn delete_database(&self, id: i32) -> Result<OkResponse> {
        self.registry.remove(id).await?;
        Ok(OkResponse { ok: true })
    }

    /// Registered providers, ordered by name.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.providers.infos()
    }
}
