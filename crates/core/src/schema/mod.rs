#![forbid(unsafe_code)]

pub mod condition;
pub mod field;
pub mod map;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CompileError, SchemaError};
use crate::ids::IdRegistry;
use crate::value::TaskValue;

pub use condition::{ConditionKind, RelationCondition};
pub use field::{BelongsToField, MatchCase, MatchField, MorphToField, ValueCast, ValueField};
pub use map::{EntryPath, MapCast, MapEntry, MapField, MatchCast, RegExpMatcher, RegExpRelationEntry, RelationEntry};

/// Turns one schema field of a row into output columns.
pub trait FieldCompiler {
    fn name(&self) -> &str;

    /// With `force_circular` every column gets the field's circular fallback.
    fn compile(
        &self,
        ids: &mut IdRegistry,
        fields: &Map<String, Value>,
        force_circular: bool,
    ) -> Result<Vec<(String, TaskValue)>, SchemaError>;
}

/// Rewrites the ids one schema field of a row refers to. `f` receives the
/// referenced entity and id and returns the replacement id.
pub trait FieldTransformer {
    fn transform(
        &self,
        fields: &Map<String, Value>,
        f: &mut dyn FnMut(&str, &Value) -> Value,
    ) -> Result<Vec<(String, Value)>, SchemaError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Field {
    Value(ValueField),
    BelongsTo(BelongsToField),
    MorphTo(MorphToField),
    Map(MapField),
    Match(MatchField),
}

impl Field {
    fn compiler(&self) -> &dyn FieldCompiler {
        match self {
            Self::Value(field) => field,
            Self::BelongsTo(field) => field,
            Self::MorphTo(field) => field,
            Self::Map(field) => field,
            Self::Match(field) => field,
        }
    }

    fn transformer(&self) -> &dyn FieldTransformer {
        match self {
            Self::Value(field) => field,
            Self::BelongsTo(field) => field,
            Self::MorphTo(field) => field,
            Self::Map(field) => field,
            Self::Match(field) => field,
        }
    }
}

impl FieldCompiler for Field {
    fn name(&self) -> &str {
        self.compiler().name()
    }

    fn compile(
        &self,
        ids: &mut IdRegistry,
        fields: &Map<String, Value>,
        force_circular: bool,
    ) -> Result<Vec<(String, TaskValue)>, SchemaError> {
        self.compiler().compile(ids, fields, force_circular)
    }
}

impl FieldTransformer for Field {
    fn transform(
        &self,
        fields: &Map<String, Value>,
        f: &mut dyn FnMut(&str, &Value) -> Value,
    ) -> Result<Vec<(String, Value)>, SchemaError> {
        self.transformer().transform(fields, f)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "PRIMARY_KEY")]
pub struct PrimaryKey {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "ENTITY", rename_all = "camelCase")]
pub struct Entity {
    pub name: String,
    pub key: PrimaryKey,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub morph_as: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, key: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            key: PrimaryKey { name: key.into() },
            fields,
            morph_as: None,
        }
    }

    pub fn with_morph_as(mut self, morph_as: impl Into<String>) -> Self {
        self.morph_as = Some(morph_as.into());
        self
    }

    pub fn key_name(&self) -> &str {
        &self.key.name
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    entities: Vec<Entity>,
}

impl Schema {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, name: &str) -> Result<&Entity, CompileError> {
        self.entities
            .iter()
            .find(|entity| entity.name == name)
            .ok_or_else(|| CompileError::UnknownEntity(name.to_string()))
    }

    /// `morphAs` tag to entity name; the first entity claiming a tag wins.
    pub fn morph_table(&self) -> HashMap<String, String> {
        let mut table = HashMap::new();
        for entity in &self.entities {
            if let Some(morph_as) = &entity.morph_as {
                table
                    .entry(morph_as.clone())
                    .or_insert_with(|| entity.name.clone());
            }
        }
        table
    }
}

#[cfg(test)]
mod tests;
