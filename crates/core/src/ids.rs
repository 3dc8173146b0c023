#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CompileError;

/// Dense surrogate id for one `(canonical entity type, natural key)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalId(u64);

impl InternalId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text form of a natural key. Keys that print the same share an id, so
/// `1` and `"1"` address the same row.
pub fn key_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "1".to_string(),
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, Default)]
pub struct IdRegistry {
    morph_table: HashMap<String, String>,
    books: HashMap<(String, String), InternalId>,
    entities: Vec<(String, Value)>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_morph_table(morph_table: HashMap<String, String>) -> Self {
        Self {
            morph_table,
            ..Self::default()
        }
    }

    pub fn canonical_type<'a>(&'a self, entity_type: &'a str) -> &'a str {
        self.morph_table
            .get(entity_type)
            .map(String::as_str)
            .unwrap_or(entity_type)
    }

    pub fn get_id(&mut self, entity_type: &str, key: &Value) -> InternalId {
        let canonical = self.canonical_type(entity_type).to_string();
        let pair = (canonical, key_text(key));
        if let Some(id) = self.books.get(&pair) {
            return *id;
        }
        self.entities.push((pair.0.clone(), key.clone()));
        let id = InternalId(self.entities.len() as u64);
        self.books.insert(pair, id);
        id
    }

    /// Lookup that never registers a new id.
    pub fn find_id(&self, entity_type: &str, key: &Value) -> Option<InternalId> {
        let pair = (
            self.canonical_type(entity_type).to_string(),
            key_text(key),
        );
        self.books.get(&pair).copied()
    }

    pub fn get_entity(&self, id: InternalId) -> Result<(&str, &Value), CompileError> {
        let index = id.0.checked_sub(1).ok_or(CompileError::UnknownInternalId(id))?;
        let (entity_type, key) = self
            .entities
            .get(index as usize)
            .ok_or(CompileError::UnknownInternalId(id))?;
        Ok((entity_type.as_str(), key))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut ids = IdRegistry::new();
        let user = ids.get_id("users", &json!(10));
        let post = ids.get_id("posts", &json!(10));
        assert_eq!(user, InternalId::new(1));
        assert_eq!(post, InternalId::new(2));
        assert_eq!(ids.get_id("users", &json!(10)), user);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn numeric_and_string_keys_share_an_id() {
        let mut ids = IdRegistry::new();
        assert_eq!(ids.get_id("users", &json!(7)), ids.get_id("users", &json!("7")));
    }

    #[test]
    fn morph_table_canonicalizes_types() {
        let table = HashMap::from([("Foo".to_string(), "foos".to_string())]);
        let mut ids = IdRegistry::with_morph_table(table);
        let aliased = ids.get_id("Foo", &json!(1));
        assert_eq!(ids.get_id("foos", &json!(1)), aliased);
        assert_eq!(ids.get_entity(aliased).unwrap(), ("foos", &json!(1)));
    }

    #[test]
    fn reverse_lookup_of_unknown_id_fails() {
        let ids = IdRegistry::new();
        assert!(matches!(
            ids.get_entity(InternalId::new(0)),
            Err(CompileError::UnknownInternalId(_))
        ));
        assert!(matches!(
            ids.get_entity(InternalId::new(3)),
            Err(CompileError::UnknownInternalId(_))
        ));
    }

    #[test]
    fn find_id_does_not_allocate() {
        let mut ids = IdRegistry::new();
        assert_eq!(ids.find_id("users", &json!(1)), None);
        let id = ids.get_id("users", &json!(1));
        assert_eq!(ids.find_id("users", &json!(1)), Some(id));
        assert_eq!(ids.len(), 1);
    }
}
