#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::Value as Json;
use sqlgrid_expr::RowContext;

/// Row keyed directly by caption.
#[derive(Debug, Default, Clone)]
pub struct CaptionRow {
    pub fields: BTreeMap<String, Json>,
}

impl CaptionRow {
    pub fn with(mut self, caption: &str, value: Json) -> Self {
        self.fields.insert(caption.to_string(), value);
        self
    }
}

impl RowContext for CaptionRow {
    fn value(&self, caption: &str) -> Option<Json> {
        self.fields.get(caption).cloned()
    }

    fn set_value(&mut self, caption: &str, value: Json) -> bool {
        match self.fields.get_mut(caption) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}
