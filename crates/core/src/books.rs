#![forbid(unsafe_code)]

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::error::IntegrityError;
use crate::ids::key_text;

/// Maps `(type, id)` pairs between id spaces.
pub trait BookKeeper {
    fn resolve_id(&mut self, entity_type: &str, id: &Value) -> Result<Value, IntegrityError>;
}

/// Hands out a random uuid per source row and remembers where it came from.
#[derive(Debug, Default)]
pub struct SerializationBookKeeper {
    uuid_by_pair: HashMap<(String, String), String>,
    pair_by_uuid: HashMap<String, (String, Value)>,
}

impl SerializationBookKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uuid(&mut self, entity_type: &str, id: &Value) -> String {
        let pair = (entity_type.to_string(), key_text(id));
        if let Some(uuid) = self.uuid_by_pair.get(&pair) {
            return uuid.clone();
        }
        let uuid = Uuid::new_v4().to_string();
        self.pair_by_uuid
            .insert(uuid.clone(), (entity_type.to_string(), id.clone()));
        self.uuid_by_pair.insert(pair, uuid.clone());
        uuid
    }

    /// The uuid already handed out for a pair, if any.
    pub fn uuid_of(&self, entity_type: &str, id: &Value) -> Option<String> {
        self.uuid_by_pair
            .get(&(entity_type.to_string(), key_text(id)))
            .cloned()
    }

    pub fn pair(&self, uuid: &str) -> Option<(&str, &Value)> {
        self.pair_by_uuid
            .get(uuid)
            .map(|(entity_type, id)| (entity_type.as_str(), id))
    }

    /// `type/id` for a known uuid, the uuid itself otherwise.
    pub fn describe(&self, uuid: &str) -> String {
        match self.pair(uuid) {
            Some((entity_type, id)) => format!("{entity_type}/{}", key_text(id)),
            None => uuid.to_string(),
        }
    }
}

impl BookKeeper for SerializationBookKeeper {
    fn resolve_id(&mut self, entity_type: &str, id: &Value) -> Result<Value, IntegrityError> {
        Ok(Value::String(self.uuid(entity_type, id)))
    }
}

/// Answers serialized uuids with the ids the target store created for them.
#[derive(Debug, Default)]
pub struct DeserializationBookKeeper {
    ids: HashMap<String, Value>,
}

impl DeserializationBookKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wire(&mut self, uuid: &Value, id: Value) {
        self.ids.insert(key_text(uuid), id);
    }

    pub fn get(&self, uuid: &str) -> Option<&Value> {
        self.ids.get(uuid)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl BookKeeper for DeserializationBookKeeper {
    fn resolve_id(&mut self, _entity_type: &str, id: &Value) -> Result<Value, IntegrityError> {
        let uuid = key_text(id);
        self.ids
            .get(&uuid)
            .cloned()
            .ok_or(IntegrityError::UnknownId(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialization_uuids_are_stable_per_pair() {
        let mut books = SerializationBookKeeper::new();
        let first = books.resolve_id("nodes", &json!(1)).unwrap();
        assert_eq!(books.resolve_id("nodes", &json!("1")).unwrap(), first);
        assert_ne!(books.resolve_id("roots", &json!(1)).unwrap(), first);

        let uuid = first.as_str().unwrap();
        assert!(Uuid::parse_str(uuid).is_ok());
        assert_eq!(books.pair(uuid), Some(("nodes", &json!(1))));
        assert_eq!(books.describe(uuid), "nodes/1");
        assert_eq!(books.describe("nope"), "nope");
    }

    #[test]
    fn deserialization_needs_wired_ids() {
        let mut books = DeserializationBookKeeper::new();
        assert!(matches!(
            books.resolve_id("nodes", &json!("abc")),
            Err(IntegrityError::UnknownId(id)) if id == "abc"
        ));
        books.wire(&json!("abc"), json!(7));
        assert_eq!(books.resolve_id("nodes", &json!("abc")).unwrap(), json!(7));
        assert_eq!(books.len(), 1);
    }
}
