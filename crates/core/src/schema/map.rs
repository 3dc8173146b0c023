#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FieldCompiler, FieldTransformer};
use super::condition::{ConditionKind, RelationCondition, is_numeric, to_integer};
use super::field::field_value;
use crate::disassemble::disassemble;
use crate::error::SchemaError;
use crate::ids::{IdRegistry, InternalId, key_text};
use crate::pattern::Pattern;
use crate::value::{AssembledAlias, Fragment, PartKind, TaskValue};

/// Where a relation entry looks inside a map: a dot path or a `/regex/` over
/// every dotted leaf path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntryPath {
    Exact(String),
    Pattern(Pattern),
}

impl EntryPath {
    fn query(&self, map: &Value, dotted: &[(String, &Value)]) -> Vec<(String, Value)> {
        match self {
            Self::Exact(path) => get_path(map, path)
                .map(|value| vec![(path.clone(), value.clone())])
                .unwrap_or_default(),
            Self::Pattern(pattern) => dotted
                .iter()
                .filter(|(path, _)| pattern.is_match(path))
                .map(|(path, value)| (path.clone(), (*value).clone()))
                .collect(),
        }
    }
}

impl TryFrom<String> for EntryPath {
    type Error = SchemaError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        if path.starts_with('/') {
            return Ok(Self::Pattern(Pattern::parse(path)?));
        }
        Ok(Self::Exact(path))
    }
}

impl From<EntryPath> for String {
    fn from(path: EntryPath) -> Self {
        match path {
            EntryPath::Exact(path) => path,
            EntryPath::Pattern(pattern) => pattern.as_str().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRelationEntry", into = "RawRelationEntry")]
pub struct RelationEntry {
    pub path: EntryPath,
    pub relation: String,
    pub condition: RelationCondition,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRelationEntry {
    path: EntryPath,
    relation: String,
    #[serde(default = "default_entry_condition")]
    relation_condition: ConditionKind,
    #[serde(default)]
    condition_matcher: String,
}

fn default_entry_condition() -> ConditionKind {
    ConditionKind::None
}

impl TryFrom<RawRelationEntry> for RelationEntry {
    type Error = SchemaError;

    fn try_from(raw: RawRelationEntry) -> Result<Self, Self::Error> {
        Ok(Self {
            condition: RelationCondition::from_parts(raw.relation_condition, &raw.condition_matcher)?,
            path: raw.path,
            relation: raw.relation,
        })
    }
}

impl From<RelationEntry> for RawRelationEntry {
    fn from(entry: RelationEntry) -> Self {
        Self {
            relation_condition: entry.condition.kind(),
            condition_matcher: entry.condition.matcher().to_string(),
            path: entry.path,
            relation: entry.relation,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchCast {
    None,
    Integer,
    String,
    Auto,
}

impl MatchCast {
    fn apply(self, text: &str) -> Value {
        match self {
            Self::None | Self::String => Value::from(text),
            Self::Integer => Value::from(to_integer(&Value::from(text))),
            Self::Auto if is_numeric(text) => Value::from(to_integer(&Value::from(text))),
            Self::Auto => Value::from(text),
        }
    }
}

/// Finds ids inside a string. `relations[n]` names the entity captured by
/// group `n`; `null` skips the group. There is one relation per group,
/// group 0 included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRegExpMatcher", into = "RawRegExpMatcher")]
pub struct RegExpMatcher {
    pub expression: Pattern,
    pub relations: Vec<Option<String>>,
    pub cast: MatchCast,
}

#[derive(Clone, Serialize, Deserialize)]
struct RawRegExpMatcher {
    expression: Pattern,
    relations: Vec<Option<String>>,
    cast: MatchCast,
}

impl RegExpMatcher {
    pub fn new(
        expression: Pattern,
        relations: Vec<Option<String>>,
        cast: MatchCast,
    ) -> Result<Self, SchemaError> {
        let groups = expression.regex().captures_len();
        if groups != relations.len() {
            return Err(SchemaError::MatcherGroups {
                expression: expression.as_str().to_string(),
                groups,
                relations: relations.len(),
            });
        }
        Ok(Self {
            expression,
            relations,
            cast,
        })
    }

    fn collect(&self, path: &str, subject: &str, out: &mut Vec<MapDependency>) {
        for captures in self.expression.regex().captures_iter(subject) {
            for (group, relation) in self.relations.iter().enumerate() {
                let (Some(relation), Some(found)) = (relation, captures.get(group)) else {
                    continue;
                };
                out.push(MapDependency {
                    id: self.cast.apply(found.as_str()),
                    relation: relation.clone(),
                    path: path.to_string(),
                    span: Some(found.range()),
                });
            }
        }
    }
}

impl TryFrom<RawRegExpMatcher> for RegExpMatcher {
    type Error = SchemaError;

    fn try_from(raw: RawRegExpMatcher) -> Result<Self, Self::Error> {
        Self::new(raw.expression, raw.relations, raw.cast)
    }
}

impl From<RegExpMatcher> for RawRegExpMatcher {
    fn from(matcher: RegExpMatcher) -> Self {
        Self {
            expression: matcher.expression,
            relations: matcher.relations,
            cast: matcher.cast,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegExpRelationEntry {
    pub path: EntryPath,
    pub matchers: Vec<RegExpMatcher>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MapEntry {
    /// The value at the path is an id.
    ValueRelationEntry(RelationEntry),
    /// The value at the path is a list of ids.
    ListRelationEntry(RelationEntry),
    /// The value at the path is a string with ids inside it.
    RegExpRelationEntry(RegExpRelationEntry),
}

impl MapEntry {
    fn collect(&self, map: &Value, dotted: &[(String, &Value)], out: &mut Vec<MapDependency>) {
        match self {
            Self::ValueRelationEntry(entry) => {
                for (path, value) in entry.path.query(map, dotted) {
                    if entry.condition.accepts(&value) {
                        out.push(MapDependency::at(value, &entry.relation, path));
                    }
                }
            }
            Self::ListRelationEntry(entry) => {
                for (path, value) in entry.path.query(map, dotted) {
                    let Value::Array(items) = value else {
                        continue;
                    };
                    for (index, item) in items.into_iter().enumerate() {
                        if entry.condition.accepts(&item) {
                            out.push(MapDependency::at(item, &entry.relation, format!("{path}.{index}")));
                        }
                    }
                }
            }
            Self::RegExpRelationEntry(entry) => {
                for (path, value) in entry.path.query(map, dotted) {
                    let Value::String(subject) = value else {
                        continue;
                    };
                    for matcher in &entry.matchers {
                        matcher.collect(&path, &subject, out);
                    }
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapDependency {
    pub id: Value,
    pub relation: String,
    pub path: String,
    // Byte range inside the string at `path`, for ids embedded in text.
    pub span: Option<Range<usize>>,
}

impl MapDependency {
    fn at(id: Value, relation: &str, path: String) -> Self {
        Self {
            id,
            relation: relation.to_string(),
            path,
            span: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MapCast {
    Json,
}

/// A structured column whose contents reference other rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapField {
    pub name: String,
    pub relations: Vec<MapEntry>,
    #[serde(default = "default_map_cast")]
    pub cast: MapCast,
    #[serde(default = "default_greedy")]
    pub greedy: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub fallback: Value,
    #[serde(default)]
    pub circular_fallback: Value,
}

fn default_map_cast() -> MapCast {
    MapCast::Json
}

fn default_greedy() -> bool {
    true
}

impl MapField {
    pub fn dependencies(&self, map: &Value) -> Vec<MapDependency> {
        let mut leaves = Vec::new();
        dot(map, "", &mut leaves);
        let mut out = Vec::new();
        for entry in &self.relations {
            entry.collect(map, &leaves, &mut out);
        }
        out
    }

    /// Replaces every dependency with the value `replacement` returns for it.
    /// Ids embedded in text are replaced by the value's key text.
    pub fn replace_ids(
        &self,
        map: &Value,
        mut replacement: impl FnMut(&str, &Value) -> Value,
    ) -> Result<Value, SchemaError> {
        let mut deps = self.dependencies(map);
        let mut out = map.clone();
        for index in 0..deps.len() {
            let dep = deps[index].clone();
            let replaced = replacement(&dep.relation, &dep.id);
            let Some(span) = dep.span else {
                let target = get_path_mut(&mut out, &dep.path).ok_or_else(|| self.invalid_path(&dep.path))?;
                *target = replaced;
                continue;
            };
            let text = key_text(&replaced);
            let target = match get_path_mut(&mut out, &dep.path) {
                Some(Value::String(target)) if target.get(span.clone()).is_some() => target,
                _ => return Err(self.invalid_path(&dep.path)),
            };
            target.replace_range(span.clone(), &text);
            let diff = text.len() as isize - span.len() as isize;
            if diff == 0 {
                continue;
            }
            for later in deps.iter_mut().skip(index + 1) {
                let Some(range) = later.span.as_mut() else {
                    continue;
                };
                if later.path == dep.path && range.start > span.start {
                    range.start = range.start.saturating_add_signed(diff);
                    range.end = range.end.saturating_add_signed(diff);
                }
            }
        }
        Ok(out)
    }

    fn invalid_path(&self, path: &str) -> SchemaError {
        SchemaError::InvalidPath {
            field: self.name.clone(),
            path: path.to_string(),
        }
    }
}

impl FieldCompiler for MapField {
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
                self.name.clone(),
                TaskValue::Raw(self.circular_fallback.clone()),
            )]);
        }
        let map = field_value(&self.name, self.optional, &self.fallback, fields)?;
        if !map.is_array() && !map.is_object() {
            return Err(SchemaError::InvalidValue {
                field: self.name.clone(),
                message: "map fields must be, or fall back to, an array or object".to_string(),
            });
        }

        let encoded = map.to_string();
        let mut nonce = 0u32;
        while encoded.contains(&format!("@snap{nonce}:")) {
            nonce += 1;
        }

        let mut markers: HashMap<(String, String), String> = HashMap::new();
        let mut marker_ids: HashMap<String, InternalId> = HashMap::new();
        let transformed = self.replace_ids(map, |relation, id| {
            let next = markers.len();
            markers
                .entry((relation.to_string(), key_text(id)))
                .or_insert_with(|| {
                    let marker = format!("@snap{nonce}:{next}@");
                    marker_ids.insert(marker.clone(), ids.get_id(relation, id));
                    marker
                })
                .clone()
                .into()
        })?;

        let tokens: Vec<Value> = marker_ids.keys().cloned().map(Value::String).collect();
        let fragments = disassemble(&transformed, &tokens)?
            .into_iter()
            .map(|part| {
                let payload = part.payload().as_str().unwrap_or_default();
                match (part.kind(), marker_ids.get(payload)) {
                    (PartKind::Alias, Some(id)) => Fragment::Alias {
                        id: *id,
                        cast: part.cast(),
                    },
                    _ => Fragment::Text(payload.to_string()),
                }
            })
            .collect();
        Ok(vec![(
            self.name.clone(),
            TaskValue::Assembled(AssembledAlias::new(fragments)),
        )])
    }
}

impl FieldTransformer for MapField {
    fn transform(
        &self,
        fields: &Map<String, Value>,
        f: &mut dyn FnMut(&str, &Value) -> Value,
    ) -> Result<Vec<(String, Value)>, SchemaError> {
        let map = field_value(&self.name, self.optional, &self.fallback, fields)?;
        Ok(vec![(self.name.clone(), self.replace_ids(map, |relation, id| f(relation, id))?)])
    }
}

/// Flattens nested containers into `(dotted path, leaf)` pairs. Empty
/// containers are leaves.
pub(crate) fn dot<'a>(value: &'a Value, prefix: &str, out: &mut Vec<(String, &'a Value)>) {
    let child = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, item) in map {
                dot(item, &child(key), out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, item) in items.iter().enumerate() {
                dot(item, &child(&index.to_string()), out);
            }
        }
        _ if prefix.is_empty() => {}
        leaf => out.push((prefix.to_string(), leaf)),
    }
}

pub(crate) fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

pub(crate) fn get_path_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |index| items.get_mut(index)),
        _ => None,
    })
}
