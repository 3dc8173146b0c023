#![forbid(unsafe_code)]

use indexmap::IndexMap;
use regex::Captures;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::books::BookKeeper;
use crate::error::RecipeError;
use crate::ids::key_text;
use crate::pattern::Pattern;
use crate::schema::condition::is_numeric;
use crate::schema::map::{dot, get_path_mut};

use super::Dep;

pub const DEFAULT_PLACEHOLDER: &str = "%id%";

/// Locates references inside a JSON document stored as text.
///
/// `paths` match dotted leaf paths exactly, `patterns` match them by regex.
/// Every handler that matches a leaf is applied in turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireJsonRecipe", into = "WireJsonRecipe")]
pub struct JsonRecipe {
    paths: IndexMap<String, MatchedJson>,
    patterns: Vec<(Pattern, MatchedJson)>,
}

impl JsonRecipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<String>, matched: MatchedJson) -> Self {
        self.paths.insert(path.into(), matched);
        self
    }

    pub fn pattern(mut self, pattern: Pattern, matched: MatchedJson) -> Self {
        self.patterns.push((pattern, matched));
        self
    }

    fn handlers<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a MatchedJson> + 'a {
        self.paths.get(path).into_iter().chain(
            self.patterns
                .iter()
                .filter(move |(pattern, _)| pattern.is_match(path))
                .map(|(_, matched)| matched),
        )
    }

    pub fn deps(&self, value: &Value) -> Result<Vec<Dep>, RecipeError> {
        let Some(decoded) = decode(value)? else {
            return Ok(Vec::new());
        };
        let mut leaves = Vec::new();
        dot(&decoded, "", &mut leaves);
        let mut deps = Vec::new();
        for (path, leaf) in leaves {
            for handler in self.handlers(&path) {
                deps.extend(handler.deps(leaf));
            }
        }
        Ok(deps)
    }

    pub fn serialize(
        &self,
        value: &Value,
        books: &mut dyn BookKeeper,
    ) -> Result<Option<Value>, RecipeError> {
        let Some(mut decoded) = decode(value)? else {
            return Ok(None);
        };
        let paths: Vec<String> = {
            let mut leaves = Vec::new();
            dot(&decoded, "", &mut leaves);
            leaves.into_iter().map(|(path, _)| path).collect()
        };
        for path in paths {
            for handler in self.handlers(&path) {
                let slot = get_path_mut(&mut decoded, &path)
                    .ok_or_else(|| RecipeError::InvalidPath(path.clone()))?;
                *slot = handler.resolve(slot, books)?;
            }
        }
        Ok(Some(Value::String(serde_json::to_string(&decoded)?)))
    }

    /// Swaps serialized uuids in the text for the ids `books` knows them by.
    /// Quoted uuids resolving to numbers lose their quotes.
    pub fn deserialize(
        &self,
        value: &Value,
        books: &mut dyn BookKeeper,
    ) -> Result<Option<Value>, RecipeError> {
        let Value::String(text) = value else {
            return Ok(Some(value.clone()));
        };
        let mut text = text.clone();
        for (entity_type, uuid) in self.deps(value)? {
            let replacement = books.resolve_id(&entity_type, &uuid)?;
            let uuid = key_text(&uuid);
            let replacement_text = key_text(&replacement);
            if replacement.is_number() || is_numeric(&replacement_text) {
                text = text.replace(&format!("\"{uuid}\""), &replacement_text);
            }
            text = text.replace(&uuid, &replacement_text);
        }
        Ok(Some(Value::String(text)))
    }
}

fn decode(value: &Value) -> Result<Option<Value>, RecipeError> {
    match value {
        Value::String(text) => Ok(Some(serde_json::from_str(text)?)),
        _ => Ok(None),
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct WireJsonRecipe {
    #[serde(default)]
    paths: IndexMap<String, MatchedJson>,
    #[serde(default)]
    patterns: IndexMap<String, MatchedJson>,
}

impl TryFrom<WireJsonRecipe> for JsonRecipe {
    type Error = RecipeError;

    fn try_from(wire: WireJsonRecipe) -> Result<Self, Self::Error> {
        let patterns = wire
            .patterns
            .into_iter()
            .map(|(pattern, matched)| Ok((Pattern::parse(pattern)?, matched)))
            .collect::<Result<_, RecipeError>>()?;
        Ok(Self {
            paths: wire.paths,
            patterns,
        })
    }
}

impl From<JsonRecipe> for WireJsonRecipe {
    fn from(recipe: JsonRecipe) -> Self {
        Self {
            paths: recipe.paths,
            patterns: recipe
                .patterns
                .into_iter()
                .map(|(pattern, matched)| (pattern.as_str().to_string(), matched))
                .collect(),
        }
    }
}

/// What a matched JSON leaf holds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMatchedJson", into = "WireMatchedJson")]
pub enum MatchedJson {
    /// Left untouched.
    #[default]
    Undefined,
    /// The whole leaf is an id of `ref_type`, unless it equals one of `optional`.
    Ref { ref_type: String, optional: Vec<Value> },
    /// Ids embedded in text, located by regex captures.
    Patterns(Vec<(Pattern, PatternReplacer)>),
}

impl MatchedJson {
    pub fn reference(ref_type: impl Into<String>, optional: Vec<Value>) -> Self {
        Self::Ref {
            ref_type: ref_type.into(),
            optional,
        }
    }

    pub fn deps(&self, value: &Value) -> Vec<Dep> {
        match self {
            Self::Undefined => Vec::new(),
            Self::Ref { ref_type, optional } => {
                if optional.contains(value) {
                    Vec::new()
                } else {
                    vec![(ref_type.clone(), value.clone())]
                }
            }
            Self::Patterns(handlers) => {
                let text = key_text(value);
                handlers
                    .iter()
                    .flat_map(|(pattern, replacer)| {
                        pattern
                            .regex()
                            .captures_iter(&text)
                            .flat_map(|captures| replacer.deps(&captures))
                            .collect::<Vec<_>>()
                    })
                    .collect()
            }
        }
    }

    pub fn resolve(&self, value: &Value, books: &mut dyn BookKeeper) -> Result<Value, RecipeError> {
        match self {
            Self::Undefined => Ok(value.clone()),
            Self::Ref { ref_type, optional } => {
                if optional.contains(value) {
                    Ok(value.clone())
                } else {
                    Ok(books.resolve_id(ref_type, value)?)
                }
            }
            Self::Patterns(handlers) => {
                let text = key_text(value);
                let mut wip = text.clone();
                let mut touched = false;
                for (pattern, replacer) in handlers {
                    for captures in pattern.regex().captures_iter(&text) {
                        touched = true;
                        wip = replacer.resolve(wip, &captures, books)?;
                    }
                }
                Ok(if touched { Value::String(wip) } else { value.clone() })
            }
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize)]
enum MatchedMode {
    #[serde(rename = "UNDEFINED_MODE")]
    Undefined,
    #[serde(rename = "SINGLE_MODE")]
    Single,
    #[serde(rename = "PATTERN_MODE")]
    Pattern,
}

#[derive(Clone, Serialize, Deserialize)]
struct WireMatchedJson {
    mode: MatchedMode,
    #[serde(default)]
    ref_type: Option<String>,
    #[serde(default)]
    optional_values: Vec<Value>,
    #[serde(default)]
    pattern_handlers: IndexMap<String, PatternReplacer>,
}

impl TryFrom<WireMatchedJson> for MatchedJson {
    type Error = RecipeError;

    fn try_from(wire: WireMatchedJson) -> Result<Self, Self::Error> {
        match wire.mode {
            MatchedMode::Undefined => Ok(Self::Undefined),
            MatchedMode::Single => {
                let ref_type = wire.ref_type.ok_or_else(|| {
                    RecipeError::InvalidConfig("SINGLE_MODE requires ref_type".to_string())
                })?;
                Ok(Self::Ref {
                    ref_type,
                    optional: wire.optional_values,
                })
            }
            MatchedMode::Pattern => {
                let handlers = wire
                    .pattern_handlers
                    .into_iter()
                    .map(|(pattern, replacer)| Ok((Pattern::parse(pattern)?, replacer)))
                    .collect::<Result<_, RecipeError>>()?;
                Ok(Self::Patterns(handlers))
            }
        }
    }
}

impl From<MatchedJson> for WireMatchedJson {
    fn from(matched: MatchedJson) -> Self {
        let mut wire = Self {
            mode: MatchedMode::Undefined,
            ref_type: None,
            optional_values: Vec::new(),
            pattern_handlers: IndexMap::new(),
        };
        match matched {
            MatchedJson::Undefined => {}
            MatchedJson::Ref { ref_type, optional } => {
                wire.mode = MatchedMode::Single;
                wire.ref_type = Some(ref_type);
                wire.optional_values = optional;
            }
            MatchedJson::Patterns(handlers) => {
                wire.mode = MatchedMode::Pattern;
                wire.pattern_handlers = handlers
                    .into_iter()
                    .map(|(pattern, replacer)| (pattern.as_str().to_string(), replacer))
                    .collect();
            }
        }
        wire
    }
}

/// Rewrites the ids captured by a pattern.
///
/// Each replacement is `(type, capture index, template)`; the template
/// contains the placeholder where the id sits, so `<<"%id%">>` rewrites
/// `<<"4">>` and leaves a bare `4` elsewhere alone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePatternReplacer", into = "WirePatternReplacer")]
pub struct PatternReplacer {
    placeholder: String,
    replacements: Vec<(String, usize, String)>,
}

impl Default for PatternReplacer {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER)
    }
}

impl PatternReplacer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            replacements: Vec::new(),
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn replace(
        mut self,
        entity_type: impl Into<String>,
        match_index: usize,
        template: impl Into<String>,
    ) -> Result<Self, RecipeError> {
        let template = template.into();
        if !template.contains(&self.placeholder) {
            return Err(RecipeError::MissingPlaceholder {
                replace: template,
                placeholder: self.placeholder,
            });
        }
        self.replacements
            .push((entity_type.into(), match_index, template));
        Ok(self)
    }

    pub fn deps(&self, captures: &Captures<'_>) -> Vec<Dep> {
        self.replacements
            .iter()
            .filter_map(|(entity_type, index, _)| {
                let found = captures.get(*index)?;
                Some((entity_type.clone(), Value::String(found.as_str().to_string())))
            })
            .collect()
    }

    pub fn resolve(
        &self,
        mut text: String,
        captures: &Captures<'_>,
        books: &mut dyn BookKeeper,
    ) -> Result<String, RecipeError> {
        for (entity_type, index, template) in &self.replacements {
            let Some(found) = captures.get(*index) else {
                continue;
            };
            let id = found.as_str();
            let resolved = books.resolve_id(entity_type, &Value::String(id.to_string()))?;
            let search = template.replace(&self.placeholder, id);
            let replacement = template.replace(&self.placeholder, &key_text(&resolved));
            text = text.replace(&search, &replacement);
        }
        Ok(text)
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct WirePatternReplacer {
    #[serde(default = "default_placeholder")]
    placeholder: String,
    #[serde(default)]
    replacements: Vec<(String, usize, String)>,
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

impl TryFrom<WirePatternReplacer> for PatternReplacer {
    type Error = RecipeError;

    fn try_from(wire: WirePatternReplacer) -> Result<Self, Self::Error> {
        wire.replacements.into_iter().try_fold(
            Self::new(wire.placeholder),
            |replacer, (entity_type, index, template)| replacer.replace(entity_type, index, template),
        )
    }
}

impl From<PatternReplacer> for WirePatternReplacer {
    fn from(replacer: PatternReplacer) -> Self {
        Self {
            placeholder: replacer.placeholder,
            replacements: replacer.replacements,
        }
    }
}
