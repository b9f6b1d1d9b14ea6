use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A schema-less data record produced by a parse rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    /// Name of the task that produced the item
    pub task: String,

    /// Name of the rule that produced the item
    pub rule: String,

    /// URL of the page the item was extracted from
    pub url: String,

    /// Extraction time
    pub time: DateTime<Utc>,

    /// Ordered field names, used as the storage column order
    pub fields: Vec<String>,

    /// Field values keyed by field name
    pub data: BTreeMap<String, Value>,
}

impl Item {
    /// Returns the table this item is stored in
    pub fn table_name(&self) -> &str {
        &self.task
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Renders a field as text for storage
    ///
    /// Strings are returned as-is, a missing field or null as an empty string, and any
    /// other value as its JSON encoding.
    pub fn text(&self, field: &str) -> String {
        match self.data.get(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}
