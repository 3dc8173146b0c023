#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::key_text;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    name: String,
    key: Value,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl EntityRow {
    pub fn new(name: impl Into<String>, key: Value, fields: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            key,
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Ordered rows read from a source store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    rows: Vec<EntityRow>,
}

impl Snapshot {
    pub fn new(rows: Vec<EntityRow>) -> Self {
        Self { rows }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn push(&mut self, row: EntityRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[EntityRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_entity(&self, name: &str, key: &Value) -> bool {
        let key = key_text(key);
        self.rows
            .iter()
            .any(|row| row.name == name && key_text(&row.key) == key)
    }
}

impl FromIterator<EntityRow> for Snapshot {
    fn from_iter<I: IntoIterator<Item = EntityRow>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
