//! Column/table resolution and save eligibility for a `SELECT`.
//!
//! The resolver decides whether the rows of a query can be written back,
//! and if so which projected columns act as key predicates and which as
//! writable values. Anything ambiguous degrades to "not saveable"; the
//! resolver never fails.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::param::parameter_names;
use crate::row::RowState;
use crate::schema::{Column, SchemaSnapshot, ValueType};
use crate::segment::{is_outer, split_comma_list, SelectSegments};

static AS_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bas\b").expect("valid alias regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// One item of the `FROM` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    /// Table name as written.
    pub table_name: String,
    /// Alias, when the item is `table alias`.
    pub alias: Option<String>,
    /// False for items that are neither `table` nor `table alias`.
    pub is_valid: bool,
}

impl TableReference {
    /// Parses one trimmed `FROM` item.
    #[must_use]
    pub fn parse(item: &str) -> Self {
        if !item.chars().any(char::is_whitespace) {
            return Self {
                table_name: item.to_string(),
                alias: None,
                is_valid: true,
            };
        }
        let parts: Vec<&str> = WHITESPACE.split(item).collect();
        match parts.as_slice() {
            [table, alias] => Self {
                table_name: (*table).to_string(),
                alias: Some((*alias).to_string()),
                is_valid: true,
            },
            _ => Self {
                table_name: item.to_string(),
                alias: None,
                is_valid: false,
            },
        }
    }

    /// True if `qualifier` names this item by alias or table name.
    #[must_use]
    pub fn answers_to(&self, qualifier: &str) -> bool {
        self.alias
            .as_deref()
            .is_some_and(|alias| alias.eq_ignore_ascii_case(qualifier))
            || self.table_name.eq_ignore_ascii_case(qualifier)
    }
}

/// One resolved projection of the `SELECT` clause.
///
/// Projections travel to the client and come back with change-data and
/// parameter requests, so they deserialize leniently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProjection {
    /// Column name, or the whole expression for unresolved items.
    #[serde(default)]
    pub column_name: String,
    /// Table qualifier from `qualifier.column`.
    #[serde(default)]
    pub alias: Option<String>,
    /// Display alias from `AS title`, quotes removed.
    #[serde(default)]
    pub title_alias: Option<String>,
    /// Display caption: title alias, `alias.column`, or the column name.
    pub caption: String,
    /// Field key in row payloads, `f1` for the first projection.
    pub internal_field_name: String,
    /// Schema type, when the column resolves against the schema.
    #[serde(rename = "type", default)]
    pub value_type: Option<ValueType>,
    /// Referenced table when the column is a foreign key.
    #[serde(default)]
    pub related_table_name: Option<String>,
    /// Referenced column when the column is a foreign key.
    #[serde(default)]
    pub related_column_name: Option<String>,
    /// False for expressions that are not a plain or qualified column.
    #[serde(default)]
    pub is_valid: bool,
    /// True when the qualifier names one of the `FROM` items.
    #[serde(default)]
    pub alias_is_table: bool,
}

impl ColumnProjection {
    fn new(
        column_name: String,
        alias: Option<String>,
        title_alias: Option<String>,
        index: usize,
        info: Option<&Column>,
        is_valid: bool,
    ) -> Self {
        let caption = match (&title_alias, &alias) {
            (Some(title), _) => title.clone(),
            (None, Some(alias)) => format!("{alias}.{column_name}"),
            (None, None) => column_name.clone(),
        };
        Self {
            column_name,
            alias,
            title_alias,
            caption,
            internal_field_name: format!("f{index}"),
            value_type: info.and_then(|c| c.value_type),
            related_table_name: info.and_then(|c| c.related_table_name.clone()),
            related_column_name: info.and_then(|c| c.related_column_name.clone()),
            is_valid,
            alias_is_table: false,
        }
    }

    /// Column name without identifier quotes, lower-cased.
    #[must_use]
    pub fn normalized_name(&self) -> String {
        self.column_name.replace('"', "").to_lowercase()
    }
}

/// Resolution of one `SELECT` against a schema.
#[derive(Debug, Clone)]
pub struct SelectResolution {
    segments: SelectSegments,
    tables: Vec<TableReference>,
    columns: Vec<ColumnProjection>,
    parameters: Vec<String>,
    table_save: Option<TableReference>,
    column_keys: Vec<ColumnProjection>,
    column_saves: Vec<ColumnProjection>,
}

impl SelectResolution {
    /// Segments `script` and resolves it.
    ///
    /// Without a schema the statement is never saveable and no projection
    /// carries a type.
    #[must_use]
    pub fn resolve(schema: Option<&SchemaSnapshot>, script: &str) -> Self {
        let segments = SelectSegments::parse(script);
        let tables: Vec<TableReference> = segments
            .from()
            .map(split_comma_list)
            .unwrap_or_default()
            .iter()
            .map(|item| TableReference::parse(item))
            .collect();

        let mut resolution = Self {
            parameters: parameter_names(script),
            segments,
            tables,
            columns: Vec::new(),
            table_save: None,
            column_keys: Vec::new(),
            column_saves: Vec::new(),
        };
        resolution.columns = resolution.extract_columns(schema);
        resolution.extract_save_target(schema);
        resolution
    }

    fn extract_columns(&self, schema: Option<&SchemaSnapshot>) -> Vec<ColumnProjection> {
        let items = self.segments.select().map(split_comma_list).unwrap_or_default();

        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let index = i + 1;
                let (expression, title_alias) = split_title_alias(item);

                let mut projection = if expression.chars().any(char::is_whitespace) {
                    let info = self.column_info(schema, None, expression);
                    ColumnProjection::new(expression.to_string(), None, title_alias, index, info, false)
                } else if expression.contains('.') {
                    let parts: Vec<&str> = expression.split('.').collect();
                    if let [qualifier, column] = parts.as_slice() {
                        let info = self.column_info(schema, Some(qualifier), column);
                        ColumnProjection::new(
                            (*column).to_string(),
                            Some((*qualifier).to_string()),
                            title_alias,
                            index,
                            info,
                            true,
                        )
                    } else {
                        let info = self.column_info(schema, None, expression);
                        ColumnProjection::new(expression.to_string(), None, title_alias, index, info, false)
                    }
                } else {
                    let info = self.column_info(schema, None, expression);
                    ColumnProjection::new(expression.to_string(), None, title_alias, index, info, true)
                };

                projection.alias_is_table = projection
                    .alias
                    .as_deref()
                    .is_some_and(|alias| self.tables.iter().any(|t| t.answers_to(alias)));
                projection
            })
            .collect()
    }

    fn column_info<'s>(
        &self,
        schema: Option<&'s SchemaSnapshot>,
        qualifier: Option<&str>,
        column_name: &str,
    ) -> Option<&'s Column> {
        let schema = schema?;
        let column_name = strip_quotes(column_name, '"');
        let table = match qualifier {
            None => self.tables.first()?,
            Some(qualifier) => self
                .tables
                .iter()
                .find(|t| {
                    t.alias
                        .as_deref()
                        .is_some_and(|alias| alias.eq_ignore_ascii_case(qualifier))
                })
                .or_else(|| {
                    self.tables
                        .iter()
                        .find(|t| t.table_name.eq_ignore_ascii_case(qualifier))
                })?,
        };
        schema.get_column(&table.table_name, column_name)
    }

    fn extract_save_target(&mut self, schema: Option<&SchemaSnapshot>) {
        self.table_save = None;
        self.column_keys.clear();
        self.column_saves.clear();

        let Some(schema) = schema else {
            return;
        };
        let Some(save) = self.tables.first() else {
            return;
        };
        if !save.is_valid {
            return;
        }

        // A column qualified with another FROM item makes the target ambiguous.
        let foreign_projection = self.columns.iter().any(|column| {
            column.alias.as_deref().is_some_and(|qualifier| {
                self.tables
                    .iter()
                    .position(|t| t.answers_to(qualifier))
                    .is_some_and(|i| i != 0)
            })
        });
        if foreign_projection {
            return;
        }

        let Some(table) = schema.get_table(&save.table_name) else {
            return;
        };

        let mut candidates: Vec<&ColumnProjection> = self
            .columns
            .iter()
            .filter(|column| column.is_valid)
            .filter(|column| match column.alias.as_deref() {
                None => save.alias.is_none() || self.tables.len() == 1,
                Some(qualifier) => save.answers_to(qualifier),
            })
            .collect();

        let mut keys = Vec::new();
        if let Some(pk) = &table.primary_key_column {
            let pk = pk.to_lowercase();
            let matches: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, column)| column.normalized_name() == pk)
                .map(|(i, _)| i)
                .collect();
            match matches.as_slice() {
                [] => {}
                [i] => keys.push(candidates.remove(*i).clone()),
                _ => return,
            }
        }

        let saves = candidates
            .into_iter()
            .filter(|column| {
                schema
                    .get_column(&table.table_name, &column.column_name.replace('"', ""))
                    .is_some_and(|db| db.value_type.is_some())
            })
            .cloned()
            .collect();

        self.table_save = Some(save.clone());
        self.column_keys = keys;
        self.column_saves = saves;
    }

    /// Rebuilds the projections from the column names a query actually
    /// returned, then recomputes save eligibility.
    ///
    /// Used when the projection list could not be derived from the text,
    /// e.g. for `SELECT *`.
    pub fn refresh_columns(&mut self, schema: Option<&SchemaSnapshot>, names: &[String]) {
        self.columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let info = self.column_info(schema, None, name);
                ColumnProjection::new(name.clone(), None, None, i + 1, info, true)
            })
            .collect();
        self.extract_save_target(schema);
    }

    /// Clause segmentation of the statement.
    #[must_use]
    pub const fn segments(&self) -> &SelectSegments {
        &self.segments
    }

    /// Statement text.
    #[must_use]
    pub fn script(&self) -> &str {
        self.segments.text()
    }

    /// `FROM` items in order.
    #[must_use]
    pub fn tables(&self) -> &[TableReference] {
        &self.tables
    }

    /// Projections in order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnProjection] {
        &self.columns
    }

    /// Distinct `<#name#>` parameters of the statement.
    #[must_use]
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// The save target, if any.
    #[must_use]
    pub const fn table_save(&self) -> Option<&TableReference> {
        self.table_save.as_ref()
    }

    /// Projections used as key predicates.
    #[must_use]
    pub fn column_keys(&self) -> &[ColumnProjection] {
        &self.column_keys
    }

    /// Projections that may be written.
    #[must_use]
    pub fn column_saves(&self) -> &[ColumnProjection] {
        &self.column_saves
    }

    /// True when rows of this statement can be written back.
    #[must_use]
    pub const fn can_save(&self) -> bool {
        self.table_save.is_some()
    }

    /// True if the field may be edited in a row of the given state.
    ///
    /// Save columns are always editable; key columns only on new rows.
    #[must_use]
    pub fn can_edit(&self, internal_field_name: &str, state: RowState) -> bool {
        let is = |c: &ColumnProjection| c.internal_field_name == internal_field_name;
        self.column_saves.iter().any(is) || (state == RowState::New && self.column_keys.iter().any(is))
    }

    /// Finds a projection by display caption.
    #[must_use]
    pub fn column_by_caption(&self, caption: &str) -> Option<&ColumnProjection> {
        self.columns.iter().find(|c| c.caption == caption)
    }
}

/// Splits `expr AS title` at a single outer `AS`.
fn split_title_alias(item: &str) -> (&str, Option<String>) {
    let matches: Vec<_> = AS_KEYWORD
        .find_iter(item)
        .filter(|m| is_outer(item, m.start()))
        .collect();
    if let [m] = matches.as_slice() {
        let title = item[m.end()..].trim();
        let title = strip_quotes(strip_quotes(title, '\''), '"');
        (item[..m.start()].trim_end(), Some(title.to_string()))
    } else {
        (item, None)
    }
}

fn strip_quotes(text: &str, quote: char) -> &str {
    text.strip_prefix(quote)
        .and_then(|rest| rest.strip_suffix(quote))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_reference_parse() {
        assert_eq!(
            TableReference::parse("orders o"),
            TableReference {
                table_name: "orders".into(),
                alias: Some("o".into()),
                is_valid: true
            }
        );
        assert!(TableReference::parse("orders").is_valid);
        assert!(!TableReference::parse("orders o join x").is_valid);
    }

    #[test]
    fn test_title_alias() {
        assert_eq!(split_title_alias("a.name as 'Full Name'"), ("a.name", Some("Full Name".into())));
        assert_eq!(split_title_alias("cast(x as int)"), ("cast(x as int)", None));
        assert_eq!(split_title_alias("x"), ("x", None));
    }

    #[test]
    fn test_projection_kinds() {
        let resolution = SelectResolution::resolve(None, "select a, t.b, x + 1 as c, s.t.u from t");
        let columns = resolution.columns();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].caption, "a");
        assert_eq!(columns[1].caption, "t.b");
        assert!(columns[1].alias_is_table);
        assert_eq!(columns[2].column_name, "x + 1");
        assert_eq!(columns[2].caption, "c");
        assert!(!columns[2].is_valid);
        assert!(!columns[3].is_valid);
        assert_eq!(columns[3].internal_field_name, "f4");
        assert!(!resolution.can_save());
    }
}
