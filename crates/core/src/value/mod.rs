#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValueError;
use crate::ids::InternalId;

/// Internal id to the real id a store assigned during replay.
pub type AliasLookup = BTreeMap<InternalId, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartKind {
    Part,
    Alias,
}

/// How an alias is written when it is substituted into an assembled value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cast {
    None,
    Json,
}

/// One `[kind, cast, payload]` triple as produced by the disassembler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "(PartKind, Cast, Value)")]
pub struct AssemblyPart {
    kind: PartKind,
    cast: Cast,
    payload: Value,
}

impl AssemblyPart {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            kind: PartKind::Part,
            cast: Cast::None,
            payload: Value::String(text.into()),
        }
    }

    pub fn alias(payload: Value, cast: Cast) -> Self {
        Self {
            kind: PartKind::Alias,
            cast,
            payload,
        }
    }

    pub fn kind(&self) -> PartKind {
        self.kind
    }

    pub fn cast(&self) -> Cast {
        self.cast
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

impl TryFrom<Vec<Value>> for AssemblyPart {
    type Error = ValueError;

    fn try_from(tuple: Vec<Value>) -> Result<Self, Self::Error> {
        let [kind, cast, payload]: [Value; 3] = tuple.try_into().map_err(|tuple: Vec<Value>| {
            ValueError::InvalidPart(format!("expected 3 elements, got {}", tuple.len()))
        })?;
        let kind = match kind.as_str() {
            Some("PART") => PartKind::Part,
            Some("ALIAS") => PartKind::Alias,
            _ => return Err(ValueError::InvalidPart(format!("invalid part type {kind}"))),
        };
        let cast = match cast.as_str() {
            Some("NONE") => Cast::None,
            Some("JSON") => Cast::Json,
            _ => return Err(ValueError::InvalidPart(format!("invalid cast type {cast}"))),
        };
        Ok(Self {
            kind,
            cast,
            payload,
        })
    }
}

impl From<AssemblyPart> for (PartKind, Cast, Value) {
    fn from(part: AssemblyPart) -> Self {
        (part.kind, part.cast, part.payload)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Fragment {
    Text(String),
    Alias { id: InternalId, cast: Cast },
}

/// A string assembled from literal fragments and aliases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AssemblyPart>", into = "Vec<AssemblyPart>")]
pub struct AssembledAlias {
    fragments: Vec<Fragment>,
}

impl AssembledAlias {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }

    pub fn from_parts(parts: Vec<AssemblyPart>) -> Result<Self, ValueError> {
        let fragments = parts
            .into_iter()
            .map(|part| match part.kind {
                PartKind::Part => match part.payload {
                    Value::String(text) => Ok(Fragment::Text(text)),
                    other => Err(ValueError::InvalidPart(format!(
                        "literal part must be a string, got {other}"
                    ))),
                },
                PartKind::Alias => part
                    .payload
                    .as_u64()
                    .map(|id| Fragment::Alias {
                        id: InternalId::new(id),
                        cast: part.cast,
                    })
                    .ok_or_else(|| {
                        ValueError::InvalidPart(format!(
                            "alias part must carry an internal id, got {}",
                            part.payload
                        ))
                    }),
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { fragments })
    }

    pub fn to_parts(&self) -> Vec<AssemblyPart> {
        self.fragments
            .iter()
            .map(|fragment| match fragment {
                Fragment::Text(text) => AssemblyPart::literal(text.clone()),
                Fragment::Alias { id, cast } => AssemblyPart::alias(Value::from(id.get()), *cast),
            })
            .collect()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn dependencies(&self) -> Vec<InternalId> {
        let mut out = Vec::new();
        for fragment in &self.fragments {
            if let Fragment::Alias { id, .. } = fragment {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        }
        out
    }

    pub fn resolve(&self, lookup: &AliasLookup) -> Result<Value, ValueError> {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Text(text) => out.push_str(text),
                Fragment::Alias { id, cast } => {
                    let value = lookup.get(id).ok_or(ValueError::MissingAlias(*id))?;
                    match cast {
                        Cast::Json => out.push_str(&value.to_string()),
                        Cast::None => out.push_str(&plain_text(value)),
                    }
                }
            }
        }
        Ok(Value::String(out))
    }
}

impl TryFrom<Vec<AssemblyPart>> for AssembledAlias {
    type Error = ValueError;

    fn try_from(parts: Vec<AssemblyPart>) -> Result<Self, Self::Error> {
        Self::from_parts(parts)
    }
}

impl From<AssembledAlias> for Vec<AssemblyPart> {
    fn from(alias: AssembledAlias) -> Self {
        alias.to_parts()
    }
}

pub(crate) fn plain_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// A column value whose final form may depend on ids assigned at replay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireValue", into = "WireValue")]
pub enum TaskValue {
    Raw(Value),
    Alias(InternalId),
    Assembled(AssembledAlias),
}

impl TaskValue {
    pub fn dependencies(&self) -> Vec<InternalId> {
        match self {
            Self::Raw(_) => Vec::new(),
            Self::Alias(id) => vec![*id],
            Self::Assembled(assembled) => assembled.dependencies(),
        }
    }

    pub fn resolve(&self, lookup: &AliasLookup) -> Result<Value, ValueError> {
        match self {
            Self::Raw(value) => Ok(value.clone()),
            Self::Alias(id) => lookup.get(id).cloned().ok_or(ValueError::MissingAlias(*id)),
            Self::Assembled(assembled) => assembled.resolve(lookup),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum WireValue {
    #[serde(rename = "TASK_RAW_VALUE")]
    Raw { value: Value },
    #[serde(rename = "TASK_ALIAS")]
    Alias { alias: InternalId },
    #[serde(rename = "TASK_ASSEMBLED_ALIAS")]
    Assembled { parts: AssembledAlias },
}

impl From<WireValue> for TaskValue {
    fn from(wire: WireValue) -> Self {
        match wire {
            WireValue::Raw { value } => Self::Raw(value),
            WireValue::Alias { alias } => Self::Alias(alias),
            WireValue::Assembled { parts } => Self::Assembled(parts),
        }
    }
}

impl From<TaskValue> for WireValue {
    fn from(value: TaskValue) -> Self {
        match value {
            TaskValue::Raw(value) => Self::Raw { value },
            TaskValue::Alias(alias) => Self::Alias { alias },
            TaskValue::Assembled(parts) => Self::Assembled { parts },
        }
    }
}
