//! Batch "change data": derive field values for many rows with rules.
//!
//! Rules run per row, in rule order. Every rule that assigns a field flags
//! it as changed and promotes a loaded row to modified. Statements issued
//! by `sql` rules share one session per database for the whole batch;
//! sessions that changed rows are kept in the transaction pool under a
//! single id.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlgrid_core::param::ParameterSource;
use sqlgrid_core::provider::DatabaseSession;
use sqlgrid_core::resolve::{ColumnProjection, SelectResolution};
use sqlgrid_core::row::Row;
use sqlgrid_core::segment::{statement_at, ScriptType};
use sqlgrid_expr::{builtins, Argument, CompiledScript, RowContext, ScriptCache, ScriptDefinition};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::registry::DatabaseRegistry;
use crate::transactions::TransactionPool;

/// Name of the row parameter of code rules.
pub const ROW_PARAMETER: &str = "eval";

/// One change rule. Unknown rule types are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ChangeRule {
    /// Query (first column of the first row) or non-query against a
    /// database, with the row as parameter source.
    Sql {
        #[serde(default)]
        internal_field_name: String,
        #[serde(default)]
        script: String,
        #[serde(default)]
        database_id: Option<i32>,
    },
    /// Counter starting at `running`, incremented per row.
    Running {
        #[serde(default)]
        internal_field_name: String,
        #[serde(default)]
        running: Value,
    },
    /// Literal value.
    Text {
        #[serde(default)]
        internal_field_name: String,
        #[serde(default)]
        text: Value,
    },
    /// Script evaluated with the row as `eval` parameter.
    Code {
        #[serde(default)]
        internal_field_name: String,
        #[serde(default)]
        script: String,
    },
    #[serde(other)]
    Unknown,
}

impl ChangeRule {
    fn field(&self) -> &str {
        match self {
            Self::Sql {
                internal_field_name,
                ..
            }
            | Self::Running {
                internal_field_name,
                ..
            }
            | Self::Text {
                internal_field_name,
                ..
            }
            | Self::Code {
                internal_field_name,
                ..
            } => internal_field_name,
            Self::Unknown => "",
        }
    }
}

/// Outcome of a change-data batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDataResult {
    /// The rows after every rule ran.
    pub data: Vec<Row>,
    /// Kept transaction when `sql` rules changed rows.
    pub transaction_id: Option<String>,
    /// Rows changed by `sql` non-queries.
    pub changed_rows: u64,
}

/// Row access for code rules: fields addressed by caption.
struct RowFields<'a> {
    row: &'a mut Row,
    columns: &'a [ColumnProjection],
}

impl RowContext for RowFields<'_> {
    fn value(&self, caption: &str) -> Option<Value> {
        let column = self.columns.iter().find(|c| c.caption == caption)?;
        Some(self.row.value(&column.internal_field_name).clone())
    }

    fn set_value(&mut self, caption: &str, value: Value) -> bool {
        let Some(column) = self.columns.iter().find(|c| c.caption == caption) else {
            return false;
        };
        self.row.assign(&column.internal_field_name, value);
        true
    }
}

struct Connection {
    session: Box<dyn DatabaseSession>,
    changes: u64,
}

/// Runs change rules against rows.
pub struct ChangeDataPipeline<'a> {
    registry: &'a DatabaseRegistry,
    executor: &'a QueryExecutor,
    scripts: &'a ScriptCache,
    transactions: &'a TransactionPool,
}

impl<'a> ChangeDataPipeline<'a> {
    #[must_use]
    pub const fn new(
        registry: &'a DatabaseRegistry,
        executor: &'a QueryExecutor,
        scripts: &'a ScriptCache,
        transactions: &'a TransactionPool,
    ) -> Self {
        Self {
            registry,
            executor,
            scripts,
            transactions,
        }
    }

    /// Applies `rules` to every row.
    ///
    /// `columns` are the projections of the grid the rows came from; they
    /// resolve `<#Caption#>` parameters and the captions code rules use.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule's error. Sessions opened so far are
    /// rolled back.
    pub async fn run(
        &self,
        mut rows: Vec<Row>,
        columns: &[ColumnProjection],
        rules: &[ChangeRule],
    ) -> Result<ChangeDataResult> {
        let mut connections = BTreeMap::new();
        if let Err(e) = self.apply(&mut rows, columns, rules, &mut connections).await {
            for (_, connection) in connections {
                if let Err(e) = connection.session.rollback().await {
                    warn!(error = %e, "Rollback after failed change data failed");
                }
            }
            return Err(e);
        }

        let mut kept = Vec::new();
        let mut changed_rows = 0;
        for (database, connection) in connections {
            if connection.changes == 0 {
                connection.session.rollback().await?;
                debug!(database, "No changes; rolled back");
            } else {
                changed_rows += connection.changes;
                kept.push(connection.session);
            }
        }

        let transaction_id = if kept.is_empty() {
            None
        } else {
            Some(self.transactions.keep(kept, Some(rows.clone())))
        };
        info!(
            rows = rows.len(),
            rules = rules.len(),
            changed_rows,
            kept = transaction_id.is_some(),
            "Applied change data"
        );
        Ok(ChangeDataResult {
            data: rows,
            transaction_id,
            changed_rows,
        })
    }

    async fn apply(
        &self,
        rows: &mut [Row],
        columns: &[ColumnProjection],
        rules: &[ChangeRule],
        connections: &mut BTreeMap<i32, Connection>,
    ) -> Result<()> {
        let mut counters: HashMap<usize, i64> = HashMap::new();
        let mut compiled: HashMap<usize, Arc<CompiledScript>> = HashMap::new();

        for row in rows.iter_mut() {
            for (index, rule) in rules.iter().enumerate() {
                let field = rule.field();
                if field.is_empty() {
                    continue;
                }
                match rule {
                    ChangeRule::Sql {
                        script,
                        database_id: Some(database_id),
                        ..
                    } if !script.is_empty() => {
                        self.apply_sql(row, columns, field, script, *database_id, connections)
                            .await?;
                    }
                    ChangeRule::Running { running, .. } => {
                        let Some(start) = running.as_i64() else {
                            continue;
                        };
                        let next = counters.entry(index).or_insert(start);
                        row.assign(field, *next);
                        *next += 1;
                    }
                    ChangeRule::Text { text, .. } => row.assign(field, text.clone()),
                    ChangeRule::Code { script, .. } if !script.is_empty() => {
                        let script = match compiled.get(&index) {
                            Some(script) => Arc::clone(script),
                            None => {
                                let script = self.scripts.get_or_compile(&code_definition(script))?;
                                compiled.insert(index, Arc::clone(&script));
                                script
                            }
                        };
                        evaluate_code(&script, row, columns, field)?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    async fn apply_sql(
        &self,
        row: &mut Row,
        columns: &[ColumnProjection],
        field: &str,
        script: &str,
        database_id: i32,
        connections: &mut BTreeMap<i32, Connection>,
    ) -> Result<()> {
        let database = self.registry.get(database_id)?;
        // Read before a session holds a connection of the pool.
        let schema = database.schema().await?;
        let connection = match connections.entry(database_id) {
            std::collections::btree_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::btree_map::Entry::Vacant(entry) => {
                let session = database.pool().await?.begin().await?;
                entry.insert(Connection {
                    session,
                    changes: 0,
                })
            }
        };
        let provider = database.provider();
        let source = Some(ParameterSource {
            columns,
            row: &*row,
        });

        match statement_at(script, 0, 0).map(|s| s.script_type) {
            Some(ScriptType::Query) => {
                let mut resolution = SelectResolution::resolve(Some(&schema), script);
                let result = self
                    .executor
                    .query(
                        provider.dialect(),
                        Some(&schema),
                        connection.session.as_mut(),
                        &mut resolution,
                        Some(1),
                        source,
                    )
                    .await?;
                let first = resolution
                    .columns()
                    .first()
                    .and_then(|column| {
                        result
                            .data
                            .first()
                            .and_then(|r| r.get(&column.internal_field_name))
                    })
                    .cloned();
                if let Some(value) = first {
                    row.assign(field, value);
                }
            }
            Some(ScriptType::NonQuery) => {
                connection.changes += self
                    .executor
                    .non_query(provider.dialect(), connection.session.as_mut(), script, source)
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Definition of a code rule: an evaluate script with every function
/// module imported and the row as `eval`.
fn code_definition(script: &str) -> ScriptDefinition {
    builtins::MODULES
        .iter()
        .fold(ScriptDefinition::evaluate(script), |definition, module| {
            definition.import(*module)
        })
        .row_parameter(ROW_PARAMETER)
}

fn evaluate_code(
    script: &CompiledScript,
    row: &mut Row,
    columns: &[ColumnProjection],
    field: &str,
) -> Result<()> {
    let value = {
        let mut fields = RowFields {
            row: &mut *row,
            columns,
        };
        script.evaluate(&mut [Argument::Row(&mut fields)])?
    };
    row.assign(field, value.into_json());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlgrid_core::row::RowState;

    fn projection(caption: &str, field: &str) -> ColumnProjection {
        serde_json::from_value(json!({"caption": caption, "internalFieldName": field})).unwrap()
    }

    #[test]
    fn test_rule_payloads() {
        let rules: Vec<ChangeRule> = serde_json::from_value(json!([
            {"type": "running", "internalFieldName": "f1", "running": 10},
            {"type": "sql", "internalFieldName": "f2", "script": "select 1", "databaseId": 3},
            {"type": "text", "internalFieldName": "f3", "text": "x"},
            {"type": "code", "internalFieldName": "f4", "script": "1 + 1"},
            {"type": "chart", "internalFieldName": "f5"}
        ]))
        .unwrap();
        assert_eq!(
            rules[1],
            ChangeRule::Sql {
                internal_field_name: String::from("f2"),
                script: String::from("select 1"),
                database_id: Some(3),
            }
        );
        assert_eq!(rules[4], ChangeRule::Unknown);
        assert_eq!(rules[4].field(), "");
    }

    #[test]
    fn test_code_rule_reads_and_writes_by_caption() {
        let columns = vec![projection("Price", "f1"), projection("Total", "f2")];
        let mut row = Row::new().with("f1", 4).with_state(RowState::Loaded);
        let script = CompiledScript::compile(code_definition(
            "eval.set(\"Total\", [Price] * 2);\nround([Price] / 3, 2)",
        ))
        .unwrap();

        evaluate_code(&script, &mut row, &columns, "f3").unwrap();

        assert_eq!(row.value("f2"), &json!(8));
        assert_eq!(row.value("f3"), &json!(1.33));
        assert!(row.is_changed("f2"));
        assert!(row.is_changed("f3"));
        assert_eq!(row.state(), Some(RowState::Modified));
    }
}
