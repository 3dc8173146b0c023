#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::condition::{ConditionKind, RelationCondition, to_float, to_integer};
use super::{Field, FieldCompiler, FieldTransformer};
use crate::error::SchemaError;
use crate::ids::IdRegistry;
use crate::value::TaskValue;

pub(crate) fn field_value<'a>(
    name: &str,
    optional: bool,
    fallback: &'a Value,
    fields: &'a Map<String, Value>,
) -> Result<&'a Value, SchemaError> {
    match fields.get(name) {
        Some(value) => Ok(value),
        None if optional => Ok(fallback),
        None => Err(SchemaError::MissingField(name.to_string())),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueCast {
    None,
    Json,
    Integer,
    Float,
}

impl ValueCast {
    pub fn apply(self, value: &Value) -> Value {
        match self {
            Self::None => value.clone(),
            Self::Json => Value::String(value.to_string()),
            Self::Integer => Value::from(to_integer(value)),
            Self::Float => Value::from(to_float(value)),
        }
    }
}

/// A plain column copied with an optional cast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueField {
    pub name: String,
    #[serde(default = "default_cast")]
    pub cast: ValueCast,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub fallback: Value,
    #[serde(default)]
    pub circular_fallback: Value,
}

fn default_cast() -> ValueCast {
    ValueCast::None
}

impl ValueField {
    pub fn new(name: impl Into<String>, cast: ValueCast) -> Self {
        Self {
            name: name.into(),
            cast,
            optional: false,
            fallback: Value::Null,
            circular_fallback: Value::Null,
        }
    }
}

impl FieldCompiler for ValueField {
    fn name(&self) -> &str {
        &self.name
    }

    fn compile(
        &self,
        _ids: &mut IdRegistry,
        fields: &Map<String, Value>,
        force_circular: bool,
    ) -> Result<Vec<(String, TaskValue)>, SchemaError> {
        if force_circular {
            return Ok(vec![(
                self.name.clone(),
                TaskValue::Raw(self.circular_fallback.clone()),
            )]);
        }
        let value = field_value(&self.name, self.optional, &self.fallback, fields)?;
        Ok(vec![(self.name.clone(), TaskValue::Raw(self.cast.apply(value)))])
    }
}

impl FieldTransformer for ValueField {
    fn transform(
        &self,
        fields: &Map<String, Value>,
        _f: &mut dyn FnMut(&str, &Value) -> Value,
    ) -> Result<Vec<(String, Value)>, SchemaError> {
        let value = field_value(&self.name, self.optional, &self.fallback, fields)?;
        Ok(vec![(self.name.clone(), value.clone())])
    }
}

/// A foreign key column referencing one row of `foreign_entity`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBelongsTo", into = "RawBelongsTo")]
pub struct BelongsToField {
    pub name: String,
    pub foreign_entity: String,
    pub local_key: String,
    pub condition: RelationCondition,
    pub optional: bool,
    pub fallback: Value,
    pub circular_fallback: Value,
}

impl BelongsToField {
    pub fn new(
        name: impl Into<String>,
        foreign_entity: impl Into<String>,
        local_key: impl Into<String>,
        condition: RelationCondition,
    ) -> Self {
        Self {
            name: name.into(),
            foreign_entity: foreign_entity.into(),
            local_key: local_key.into(),
            condition,
            optional: false,
            fallback: Value::Null,
            circular_fallback: Value::Null,
        }
    }
}

impl FieldCompiler for BelongsToField {
    fn name(&self) -> &str {
        &self.name
    }

    fn compile(
        &self,
        ids: &mut IdRegistry,
        fields: &Map<String, Value>,
        force_circular: bool,
    ) -> Result<Vec<(String, TaskValue)>, SchemaError> {
        if force_circular {
            return Ok(vec![(
                self.local_key.clone(),
                TaskValue::Raw(self.circular_fallback.clone()),
            )]);
        }
        let value = field_value(&self.name, self.optional, &self.fallback, fields)?;
        let compiled = if self.condition.accepts(value) {
            TaskValue::Alias(ids.get_id(&self.foreign_entity, value))
        } else {
            TaskValue::Raw(value.clone())
        };
        Ok(vec![(self.local_key.clone(), compiled)])
    }
}

impl FieldTransformer for BelongsToField {
    fn transform(
        &self,
        fields: &Map<String, Value>,
        f: &mut dyn FnMut(&str, &Value) -> Value,
    ) -> Result<Vec<(String, Value)>, SchemaError> {
        let value = field_value(&self.name, self.optional, &self.fallback, fields)?;
        let transformed = if self.condition.accepts(value) {
            f(&self.foreign_entity, value)
        } else {
            value.clone()
        };
        Ok(vec![(self.name.clone(), transformed)])
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBelongsTo {
    name: String,
    foreign_entity: String,
    local_key: String,
    #[serde(default = "default_belongs_to_condition")]
    relation_condition: ConditionKind,
    #[serde(default)]
    condition_matcher: String,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    fallback: Value,
    #[serde(default)]
    circular_fallback: Value,
}

fn default_belongs_to_condition() -> ConditionKind {
    ConditionKind::NonZeroInt
}

impl TryFrom<RawBelongsTo> for BelongsToField {
    type Error = SchemaError;

    fn try_from(raw: RawBelongsTo) -> Result<Self, Self::Error> {
        Ok(Self {
            condition: RelationCondition::from_parts(raw.relation_condition, &raw.condition_matcher)?,
            name: raw.name,
            foreign_entity: raw.foreign_entity,
            local_key: raw.local_key,
            optional: raw.optional,
            fallback: raw.fallback,
            circular_fallback: raw.circular_fallback,
        })
    }
}

impl From<BelongsToField> for RawBelongsTo {
    fn from(field: BelongsToField) -> Self {
        Self {
            relation_condition: field.condition.kind(),
            condition_matcher: field.condition.matcher().to_string(),
            name: field.name,
            foreign_entity: field.foreign_entity,
            local_key: field.local_key,
            optional: field.optional,
            fallback: field.fallback,
            circular_fallback: field.circular_fallback,
        }
    }
}

/// A polymorphic reference stored as `[type, id]` and written to two columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MorphToField {
    pub name: String,
    pub id_field: String,
    pub type_field: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub fallback: Value,
    #[serde(default)]
    pub circular_fallback: Value,
    #[serde(default)]
    pub type_circular_fallback: Value,
}

impl FieldCompiler for MorphToField {
    fn name(&self) -> &str {
        &self.name
    }

    fn compile(
        &self,
        ids: &mut IdRegistry,
        fields: &Map<String, Value>,
        force_circular: bool,
    ) -> Result<Vec<(String, TaskValue)>, SchemaError> {
        if force_circular {
            return Ok(vec![
                (
                    self.id_field.clone(),
                    TaskValue::Raw(self.circular_fallback.clone()),
                ),
                (
                    self.type_field.clone(),
                    TaskValue::Raw(self.type_circular_fallback.clone()),
                ),
            ]);
        }
        let morph = field_value(&self.name, self.optional, &self.fallback, fields)?;
        let (morph_type, id) = match morph.as_array().map(Vec::as_slice) {
            Some([morph_type, id, ..]) => (morph_type, id),
            None if morph.is_null() => {
                return Ok(vec![
                    (self.id_field.clone(), TaskValue::Raw(Value::Null)),
                    (self.type_field.clone(), TaskValue::Raw(Value::Null)),
                ]);
            }
            _ => {
                return Err(SchemaError::InvalidValue {
                    field: self.name.clone(),
                    message: format!("expected [type, id], got {morph}"),
                });
            }
        };
        let id_value = match (morph_type.as_str(), id) {
            (Some(type_name), Value::String(_) | Value::Number(_) | Value::Bool(_)) => {
                TaskValue::Alias(ids.get_id(type_name, id))
            }
            _ => TaskValue::Raw(id.clone()),
        };
        Ok(vec![
            (self.id_field.clone(), id_value),
            (self.type_field.clone(), TaskValue::Raw(morph_type.clone())),
        ])
    }
}

impl FieldTransformer for MorphToField {
    /// Only `[type, id]` pairs are rewritten; anything else passes through.
    fn transform(
        &self,
        fields: &Map<String, Value>,
        f: &mut dyn FnMut(&str, &Value) -> Value,
    ) -> Result<Vec<(String, Value)>, SchemaError> {
        let morph = field_value(&self.name, self.optional, &self.fallback, fields)?;
        let transformed = match morph.as_array().map(Vec::as_slice) {
            Some([Value::String(morph_type), id]) => {
                Value::Array(vec![Value::String(morph_type.clone()), f(morph_type, id)])
            }
            _ => morph.clone(),
        };
        Ok(vec![(self.name.clone(), transformed)])
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchCase(pub Value, pub Field);

/// Picks the field definition to compile from the value of `name`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchField {
    pub name: String,
    pub cases: Vec<MatchCase>,
    pub default: Box<Field>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub fallback: Value,
    #[serde(default)]
    pub circular_fallback: Value,
}

impl MatchField {
    pub fn resolve(&self, fields: &Map<String, Value>) -> Result<&Field, SchemaError> {
        let value = field_value(&self.name, self.optional, &self.fallback, fields)?;
        Ok(self
            .cases
            .iter()
            .find(|MatchCase(candidate, _)| candidate == value)
            .map(|MatchCase(_, field)| field)
            .unwrap_or(self.default.as_ref()))
    }
}

impl FieldCompiler for MatchField {
    fn name(&self) -> &str {
        &self.name
    }

    fn compile(
        &self,
        ids: &mut IdRegistry,
        fields: &Map<String, Value>,
        force_circular: bool,
    ) -> Result<Vec<(String, TaskValue)>, SchemaError> {
        self.resolve(fields)?.compile(ids, fields, force_circular)
    }
}

impl FieldTransformer for MatchField {
    fn transform(
        &self,
        fields: &Map<String, Value>,
        f: &mut dyn FnMut(&str, &Value) -> Value,
    ) -> Result<Vec<(String, Value)>, SchemaError> {
        self.resolve(fields)?.transform(fields, f)
    }
}
