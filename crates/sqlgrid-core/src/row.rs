//! Row records exchanged with the grid client.
//!
//! A row is a JSON object keyed by internal field name (`f1`, `f2`, ...)
//! plus two reserved fields: `_state` (see [`RowState`]) and `_changed`, an
//! object mapping field names to `true` for edited fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved field holding the numeric row state.
pub const STATE_FIELD: &str = "_state";
/// Reserved field holding per-field changed flags.
pub const CHANGED_FIELD: &str = "_changed";

/// Edit state of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowState {
    /// Unchanged since it was loaded.
    Loaded = 0,
    /// Existing row with edited fields.
    Modified = 1,
    /// Row to insert.
    New = 2,
    /// Row to delete.
    Deleted = 3,
}

impl RowState {
    /// Maps the wire code to a state.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Loaded),
            1 => Some(Self::Modified),
            2 => Some(Self::New),
            3 => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Returns the wire code.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }
}

/// One data record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a field, or `None` if absent.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns the value of a field, treating absent fields as JSON null.
    #[must_use]
    pub fn value(&self, field: &str) -> &Value {
        self.0.get(field).unwrap_or(&Value::Null)
    }

    /// Sets a field value without touching state or changed flags.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Builder form of [`Row::set`].
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Returns the row state. Non-integer or unknown codes yield `None`.
    #[must_use]
    pub fn state(&self) -> Option<RowState> {
        self.0
            .get(STATE_FIELD)
            .and_then(Value::as_i64)
            .and_then(RowState::from_code)
    }

    /// Overwrites the row state.
    pub fn set_state(&mut self, state: RowState) {
        self.0.insert(STATE_FIELD.to_string(), Value::from(state.code()));
    }

    /// Builder form of [`Row::set_state`].
    #[must_use]
    pub fn with_state(mut self, state: RowState) -> Self {
        self.set_state(state);
        self
    }

    /// Returns true when the field's changed flag is `true`.
    #[must_use]
    pub fn is_changed(&self, field: &str) -> bool {
        self.0
            .get(CHANGED_FIELD)
            .and_then(|changed| changed.get(field))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Flags a field as changed and promotes a loaded row to modified.
    ///
    /// New and deleted rows keep their state.
    pub fn mark_changed(&mut self, field: &str) {
        let changed = self
            .0
            .entry(CHANGED_FIELD)
            .or_insert_with(|| Value::Object(Map::new()));
        if !changed.is_object() {
            *changed = Value::Object(Map::new());
        }
        if let Value::Object(flags) = changed {
            flags.insert(field.to_string(), Value::Bool(true));
        }

        if matches!(self.state(), None | Some(RowState::Loaded)) {
            self.set_state(RowState::Modified);
        }
    }

    /// Sets a field and flags it as changed.
    pub fn assign(&mut self, field: &str, value: impl Into<Value>) {
        self.set(field, value);
        self.mark_changed(field);
    }

    /// Returns the underlying JSON object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the row into its JSON object.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_state_requires_integer() {
        let row: Row = serde_json::from_value(json!({"_state": 1})).unwrap();
        assert_eq!(row.state(), Some(RowState::Modified));

        let row: Row = serde_json::from_value(json!({"_state": "1"})).unwrap();
        assert_eq!(row.state(), None);

        let row: Row = serde_json::from_value(json!({"_state": 9})).unwrap();
        assert_eq!(row.state(), None);
    }

    #[test]
    fn test_changed_flag_must_be_true() {
        let row: Row = serde_json::from_value(json!({
            "_changed": {"f1": true, "f2": false, "f3": "yes"}
        }))
        .unwrap();
        assert!(row.is_changed("f1"));
        assert!(!row.is_changed("f2"));
        assert!(!row.is_changed("f3"));
        assert!(!row.is_changed("f4"));
    }

    #[test]
    fn test_mark_changed_promotes_loaded_only() {
        let mut loaded = Row::new().with_state(RowState::Loaded);
        loaded.assign("f1", 5);
        assert_eq!(loaded.state(), Some(RowState::Modified));
        assert!(loaded.is_changed("f1"));
        assert_eq!(loaded.value("f1"), &json!(5));

        let mut fresh = Row::new();
        fresh.mark_changed("f2");
        assert_eq!(fresh.state(), Some(RowState::Modified));

        let mut inserted = Row::new().with_state(RowState::New);
        inserted.mark_changed("f1");
        assert_eq!(inserted.state(), Some(RowState::New));
    }

    #[test]
    fn test_row_serializes_transparently() {
        let row = Row::new().with("f1", "x").with_state(RowState::New);
        assert_eq!(serde_json::to_value(&row).unwrap(), json!({"f1": "x", "_state": 2}));
    }
}
