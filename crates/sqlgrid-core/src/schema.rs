//! Schema snapshot: tables, columns and foreign-key edges of one database.
//!
//! A [`SchemaSnapshot`] is immutable once built. Lookups are
//! case-insensitive; the original casing is kept for display and for
//! generated SQL.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Abstract value type of a column, independent of engine type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    /// Boolean.
    Boolean,
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Exact numeric.
    Decimal,
    /// Floating point.
    Double,
    /// Character data.
    Text,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
    /// Time of day.
    Time,
    /// Unique identifier.
    Uuid,
    /// Binary data.
    Binary,
    /// JSON document.
    Json,
}

impl ValueType {
    /// Returns true for integer and floating/exact numeric types.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::SmallInt | Self::Integer | Self::BigInt | Self::Decimal | Self::Double
        )
    }

    /// Returns true for integer types.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::SmallInt | Self::Integer | Self::BigInt)
    }
}

/// A queryable relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table name as reported by the catalog.
    pub table_name: String,
    /// Whether the relation is a view.
    pub is_view: bool,
    /// The single primary-key column, if the table has exactly one.
    pub primary_key_column: Option<String>,
}

impl Table {
    /// Creates a base table without a primary key.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            is_view: false,
            primary_key_column: None,
        }
    }

    /// Marks the relation as a view.
    #[must_use]
    pub const fn view(mut self) -> Self {
        self.is_view = true;
        self
    }

    /// Sets the primary-key column.
    #[must_use]
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key_column = Some(column.into());
        self
    }
}

/// A field of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Owning table.
    pub table_name: String,
    /// Column name as reported by the catalog.
    pub column_name: String,
    /// Resolved value type; `None` when the engine type is not supported.
    #[serde(rename = "type")]
    pub value_type: Option<ValueType>,
    /// Engine type name.
    pub type_name: String,
    /// Declared maximum length for character/binary columns, 0 otherwise.
    pub max_length: u32,
    /// Whether NULL is allowed.
    pub is_nullable: bool,
    /// Referenced table when this column is a foreign key.
    pub related_table_name: Option<String>,
    /// Referenced column when this column is a foreign key.
    pub related_column_name: Option<String>,
}

impl Column {
    /// Creates a nullable column of the given type.
    #[must_use]
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
            value_type: Some(value_type),
            type_name: String::new(),
            max_length: 0,
            is_nullable: true,
            related_table_name: None,
            related_column_name: None,
        }
    }

    /// Creates a column whose engine type has no abstract mapping.
    #[must_use]
    pub fn untyped(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            value_type: None,
            type_name: type_name.into(),
            ..Self::new(table_name, column_name, ValueType::Text)
        }
    }

    /// Sets the engine type name.
    #[must_use]
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Sets the maximum length.
    #[must_use]
    pub const fn max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }
}

/// A foreign-key edge: `child_table.child_column` references
/// `parent_table.parent_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Referenced table.
    pub parent_table: String,
    /// Referenced column.
    pub parent_column: String,
    /// Referencing table.
    pub child_table: String,
    /// Referencing column.
    pub child_column: String,
}

impl Relation {
    /// Creates a relation.
    #[must_use]
    pub fn new(
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
        child_table: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        Self {
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
            child_table: child_table.into(),
            child_column: child_column.into(),
        }
    }
}

/// Where a primary-key candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySource {
    /// Declared primary-key constraint.
    PrimaryKey,
    /// Unique index or unique constraint.
    UniqueIndex,
}

/// One column of a primary-key constraint or unique index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCandidate {
    /// Table the constraint belongs to.
    pub table_name: String,
    /// Constraint or index name; columns sharing it form one key.
    pub key_name: String,
    /// Column participating in the key.
    pub column_name: String,
    /// Constraint kind.
    pub source: KeySource,
}

impl KeyCandidate {
    /// Creates a candidate.
    #[must_use]
    pub fn new(
        table_name: impl Into<String>,
        key_name: impl Into<String>,
        column_name: impl Into<String>,
        source: KeySource,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            key_name: key_name.into(),
            column_name: column_name.into(),
            source,
        }
    }
}

/// Reduces raw key constraints to at most one key column per table.
///
/// A declared single-column primary key wins. A table without any declared
/// primary key falls back to its unique indexes, but only when exactly one
/// single-column unique index exists. Composite or ambiguous keys yield no
/// entry. The returned map is keyed by lower-cased table name.
#[must_use]
pub fn resolve_primary_keys(candidates: &[KeyCandidate]) -> HashMap<String, String> {
    let mut groups: HashMap<(String, KeySource, &str), Vec<&str>> = HashMap::new();
    for candidate in candidates {
        groups
            .entry((
                candidate.table_name.to_lowercase(),
                candidate.source,
                candidate.key_name.as_str(),
            ))
            .or_default()
            .push(candidate.column_name.as_str());
    }

    let mut declared: HashMap<String, Vec<Vec<&str>>> = HashMap::new();
    let mut unique: HashMap<String, Vec<Vec<&str>>> = HashMap::new();
    for ((table, source, _), columns) in groups {
        let target = match source {
            KeySource::PrimaryKey => &mut declared,
            KeySource::UniqueIndex => &mut unique,
        };
        target.entry(table).or_default().push(columns);
    }

    let mut keys = HashMap::new();
    for (table, groups) in &declared {
        if let [columns] = groups.as_slice() {
            if let [column] = columns.as_slice() {
                keys.insert(table.clone(), (*column).to_string());
            }
        }
    }
    for (table, groups) in &unique {
        if declared.contains_key(table) {
            continue;
        }
        let mut single = groups.iter().filter(|columns| columns.len() == 1);
        if let (Some(columns), None) = (single.next(), single.next()) {
            keys.insert(table.clone(), columns[0].to_string());
        }
    }
    keys
}

/// Immutable, case-insensitively indexed schema of one database.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    tables: Vec<Table>,
    columns: Vec<Column>,
    relations: Vec<Relation>,
    table_index: HashMap<String, usize>,
    column_index: HashMap<(String, String), usize>,
    columns_by_table: HashMap<String, Vec<usize>>,
}

impl SchemaSnapshot {
    /// Starts an empty snapshot builder.
    #[must_use]
    pub fn builder() -> SchemaSnapshotBuilder {
        SchemaSnapshotBuilder::default()
    }

    /// Indexes the given catalog data.
    ///
    /// Each relation stamps its parent table/column onto the child column.
    /// Relations whose endpoints are unknown are ignored.
    #[must_use]
    pub fn new(tables: Vec<Table>, mut columns: Vec<Column>, relations: Vec<Relation>) -> Self {
        let mut table_index = HashMap::with_capacity(tables.len());
        for (i, table) in tables.iter().enumerate() {
            table_index.entry(table.table_name.to_lowercase()).or_insert(i);
        }

        let mut column_index = HashMap::with_capacity(columns.len());
        let mut columns_by_table: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, column) in columns.iter().enumerate() {
            let table = column.table_name.to_lowercase();
            column_index
                .entry((table.clone(), column.column_name.to_lowercase()))
                .or_insert(i);
            columns_by_table.entry(table).or_default().push(i);
        }

        for relation in &relations {
            let key = |t: &str, c: &str| (t.to_lowercase(), c.to_lowercase());
            let parent = column_index
                .get(&key(&relation.parent_table, &relation.parent_column))
                .copied();
            let child = column_index
                .get(&key(&relation.child_table, &relation.child_column))
                .copied();
            if let (Some(parent), Some(child)) = (parent, child) {
                let table = columns[parent].table_name.clone();
                let column = columns[parent].column_name.clone();
                columns[child].related_table_name = Some(table);
                columns[child].related_column_name = Some(column);
            }
        }

        Self {
            tables,
            columns,
            relations,
            table_index,
            column_index,
            columns_by_table,
        }
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn get_table(&self, table_name: &str) -> Option<&Table> {
        self.table_index
            .get(&table_name.to_lowercase())
            .map(|&i| &self.tables[i])
    }

    /// Returns all tables in catalog order.
    #[must_use]
    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Returns all relations.
    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Looks up a column by table and column name.
    #[must_use]
    pub fn get_column(&self, table_name: &str, column_name: &str) -> Option<&Column> {
        self.column_index
            .get(&(table_name.to_lowercase(), column_name.to_lowercase()))
            .map(|&i| &self.columns[i])
    }

    /// Returns the columns of a table in catalog order; empty when unknown.
    pub fn get_columns(&self, table_name: &str) -> impl Iterator<Item = &Column> {
        self.columns_by_table
            .get(&table_name.to_lowercase())
            .into_iter()
            .flatten()
            .map(|&i| &self.columns[i])
    }
}

/// Collects catalog entries for a [`SchemaSnapshot`].
#[derive(Debug, Default)]
pub struct SchemaSnapshotBuilder {
    tables: Vec<Table>,
    columns: Vec<Column>,
    relations: Vec<Relation>,
}

impl SchemaSnapshotBuilder {
    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Builds the indexed snapshot.
    #[must_use]
    pub fn build(self) -> SchemaSnapshot {
        SchemaSnapshot::new(self.tables, self.columns, self.relations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::builder()
            .table(Table::new("Customer").primary_key("Id"))
            .table(Table::new("Orders").primary_key("id"))
            .column(Column::new("Customer", "Id", ValueType::Integer))
            .column(Column::new("Customer", "Name", ValueType::Text))
            .column(Column::new("Orders", "id", ValueType::Integer))
            .column(Column::new("Orders", "customer_id", ValueType::Integer))
            .relation(Relation::new("Customer", "Id", "Orders", "customer_id"))
            .build()
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let schema = snapshot();
        assert_eq!(schema.get_table("CUSTOMER").unwrap().table_name, "Customer");
        assert_eq!(schema.get_column("customer", "NAME").unwrap().column_name, "Name");
        assert!(schema.get_table("missing").is_none());
    }

    #[test]
    fn test_columns_by_table_keep_catalog_order() {
        let schema = snapshot();
        let names: Vec<_> = schema
            .get_columns("orders")
            .map(|c| c.column_name.as_str())
            .collect();
        assert_eq!(names, ["id", "customer_id"]);
        assert_eq!(schema.get_columns("nope").count(), 0);
    }

    #[test]
    fn test_relation_marks_child_column() {
        let schema = snapshot();
        let fk = schema.get_column("Orders", "customer_id").unwrap();
        assert_eq!(fk.related_table_name.as_deref(), Some("Customer"));
        assert_eq!(fk.related_column_name.as_deref(), Some("Id"));
        assert!(schema.get_column("Customer", "Id").unwrap().related_table_name.is_none());
    }

    #[test]
    fn test_declared_single_primary_key_wins() {
        let keys = resolve_primary_keys(&[
            KeyCandidate::new("T", "pk_t", "id", KeySource::PrimaryKey),
            KeyCandidate::new("T", "ux_code", "code", KeySource::UniqueIndex),
        ]);
        assert_eq!(keys.get("t").map(String::as_str), Some("id"));
    }

    #[test]
    fn test_composite_primary_key_yields_none() {
        let keys = resolve_primary_keys(&[
            KeyCandidate::new("T", "pk_t", "a", KeySource::PrimaryKey),
            KeyCandidate::new("T", "pk_t", "b", KeySource::PrimaryKey),
            KeyCandidate::new("T", "ux_code", "code", KeySource::UniqueIndex),
        ]);
        assert!(keys.is_empty());
    }

    #[test]
    fn test_unique_index_fallback_requires_single_candidate() {
        let keys = resolve_primary_keys(&[
            KeyCandidate::new("A", "ux_a", "code", KeySource::UniqueIndex),
            KeyCandidate::new("B", "ux_b1", "x", KeySource::UniqueIndex),
            KeyCandidate::new("B", "ux_b2", "y", KeySource::UniqueIndex),
            KeyCandidate::new("C", "ux_c", "p", KeySource::UniqueIndex),
            KeyCandidate::new("C", "ux_c", "q", KeySource::UniqueIndex),
        ]);
        assert_eq!(keys.get("a").map(String::as_str), Some("code"));
        assert!(!keys.contains_key("b"));
        assert!(!keys.contains_key("c"));
    }
}
