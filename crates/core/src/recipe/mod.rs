#![forbid(unsafe_code)]

mod json;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::books::BookKeeper;
use crate::error::RecipeError;
use crate::ids::key_text;
use crate::pattern::Pattern;

pub use json::{DEFAULT_PLACEHOLDER, JsonRecipe, MatchedJson, PatternReplacer};

/// A `(type, id)` pair a serialized row depends on.
pub type Dep = (String, Value);

/// How one field of a row is carried across serialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireIngredient", into = "WireIngredient")]
pub enum Ingredient {
    /// Copied as is.
    Value,
    /// An id of `ref_type`, unless it equals one of `optional`.
    Ref { ref_type: String, optional: Vec<Value> },
    /// Always this constant.
    Raw(Value),
    Morph(MorphIngredient),
    Match(MatchIngredient),
    Json(JsonRecipe),
    /// Serialized with `fallback` on insert; `real` lands in a later update.
    Circular {
        real: Box<Ingredient>,
        fallback: Box<Ingredient>,
    },
}

/// An id whose type is named by another field of the row.
#[derive(Clone, Debug, PartialEq)]
pub struct MorphIngredient {
    pub field: String,
    pub morph_map: IndexMap<String, String>,
    pub optional: Vec<Value>,
}

impl MorphIngredient {
    fn target<'a>(&'a self, value: &Value, row: &Map<String, Value>) -> Option<&'a str> {
        let morph_type = row.get(&self.field)?;
        if self.optional.contains(value) || self.optional.contains(morph_type) {
            return None;
        }
        self.morph_map.get(&key_text(morph_type)).map(String::as_str)
    }
}

/// Picks an ingredient by the value of another field of the row.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchIngredient {
    pub field: String,
    pub on: IndexMap<String, Ingredient>,
    pub patterns: Vec<(Pattern, Ingredient)>,
    pub default: Option<Box<Ingredient>>,
}

impl MatchIngredient {
    fn select(&self, row: &Map<String, Value>) -> Option<&Ingredient> {
        let comparee = key_text(row.get(&self.field)?);
        if let Some(ingredient) = self.on.get(&comparee) {
            return Some(ingredient);
        }
        self.patterns
            .iter()
            .find(|(pattern, _)| pattern.is_match(&comparee))
            .map(|(_, ingredient)| ingredient)
            .or(self.default.as_deref())
    }
}

impl Ingredient {
    pub fn reference(ref_type: impl Into<String>) -> Self {
        Self::Ref {
            ref_type: ref_type.into(),
            optional: Vec::new(),
        }
    }

    pub fn morph<K, V>(field: impl Into<String>, morph_map: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Morph(MorphIngredient {
            field: field.into(),
            morph_map: morph_map
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
            optional: Vec::new(),
        })
    }

    pub fn circular(real: Ingredient, fallback: Ingredient) -> Self {
        Self::Circular {
            real: Box::new(real),
            fallback: Box::new(fallback),
        }
    }

    /// Values that mean "no reference". Only `Ref` and `Morph` carry them.
    pub fn with_optional(mut self, values: Vec<Value>) -> Self {
        match &mut self {
            Self::Ref { optional, .. } => *optional = values,
            Self::Morph(morph) => morph.optional = values,
            _ => {}
        }
        self
    }

    pub fn deps(
        &self,
        value: &Value,
        row: &Map<String, Value>,
        circular: bool,
    ) -> Result<Vec<Dep>, RecipeError> {
        match self {
            Self::Value | Self::Raw(_) => Ok(Vec::new()),
            Self::Ref { ref_type, optional } => {
                if optional.contains(value) {
                    Ok(Vec::new())
                } else {
                    Ok(vec![(ref_type.clone(), value.clone())])
                }
            }
            Self::Morph(morph) => Ok(morph
                .target(value, row)
                .map(|target| vec![(target.to_string(), value.clone())])
                .unwrap_or_default()),
            Self::Match(matcher) => match matcher.select(row) {
                Some(ingredient) => ingredient.deps(value, row, false),
                None => Ok(Vec::new()),
            },
            Self::Json(recipe) => recipe.deps(value),
            Self::Circular { real, fallback } => {
                if circular {
                    real.deps(value, row, false)
                } else {
                    fallback.deps(value, row, false)
                }
            }
        }
    }

    /// `None` drops the field from the serialized row.
    pub fn serialize(
        &self,
        value: &Value,
        row: &Map<String, Value>,
        books: &mut dyn BookKeeper,
        circular: bool,
    ) -> Result<Option<Value>, RecipeError> {
        match self {
            Self::Value => Ok(Some(value.clone())),
            Self::Raw(raw) => Ok(Some(raw.clone())),
            Self::Ref { ref_type, optional } => {
                if optional.contains(value) {
                    Ok(Some(value.clone()))
                } else {
                    Ok(Some(books.resolve_id(ref_type, value)?))
                }
            }
            Self::Morph(morph) => match morph.target(value, row) {
                Some(target) => Ok(Some(books.resolve_id(target, value)?)),
                None => Ok(None),
            },
            Self::Match(matcher) => match matcher.select(row) {
                Some(ingredient) => ingredient.serialize(value, row, books, circular),
                None => Ok(None),
            },
            Self::Json(recipe) => recipe.serialize(value, books),
            Self::Circular { real, fallback } => {
                if circular {
                    Ingredient::serialize(real, value, row, books, false)
                } else {
                    Ingredient::serialize(fallback, value, row, books, false)
                }
            }
        }
    }

    pub fn deserialize(
        &self,
        value: &Value,
        row: &Map<String, Value>,
        books: &mut dyn BookKeeper,
    ) -> Result<Option<Value>, RecipeError> {
        match self {
            Self::Value | Self::Raw(_) | Self::Ref { .. } | Self::Morph(_) => {
                self.serialize(value, row, books, false)
            }
            Self::Match(matcher) => match matcher.select(row) {
                Some(ingredient) => ingredient.deserialize(value, row, books),
                None => Ok(None),
            },
            Self::Json(recipe) => recipe.deserialize(value, books),
            Self::Circular { real, .. } => real.deserialize(value, row, books),
        }
    }

    /// Fields an update row needs besides the primary key for this
    /// ingredient to deserialize.
    pub fn required_extra_fields(&self) -> Vec<&str> {
        match self {
            Self::Morph(morph) => vec![morph.field.as_str()],
            Self::Match(matcher) => vec![matcher.field.as_str()],
            Self::Circular { real, .. } => real.required_extra_fields(),
            Self::Value | Self::Ref { .. } | Self::Raw(_) | Self::Json(_) => Vec::new(),
        }
    }
}

/// Field by field instructions for one row type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    primary_key: String,
    #[serde(default)]
    ingredients: IndexMap<String, Ingredient>,
}

impl Recipe {
    pub fn new(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            ingredients: IndexMap::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, ingredient: Ingredient) -> Self {
        self.ingredients.insert(field.into(), ingredient);
        self
    }

    pub fn from_json(text: &str) -> Result<Self, RecipeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn ingredients(&self) -> &IndexMap<String, Ingredient> {
        &self.ingredients
    }
}

/// Reads a `{type: recipe}` document.
pub fn recipes_from_json(text: &str) -> Result<IndexMap<String, Recipe>, RecipeError> {
    Ok(serde_json::from_str(text)?)
}

#[derive(Clone, Default, Serialize, Deserialize)]
struct EmptyConfig {}

#[derive(Clone, Serialize, Deserialize)]
struct RefConfig {
    #[serde(rename = "type")]
    ref_type: String,
    #[serde(default)]
    optional_values: Vec<Value>,
}

#[derive(Clone, Serialize, Deserialize)]
struct RawConfig {
    #[serde(default)]
    value: Value,
}

#[derive(Clone, Serialize, Deserialize)]
struct MorphMapperConfig {
    #[serde(default)]
    morph_map: IndexMap<String, String>,
}

#[derive(Clone, Serialize, Deserialize)]
struct MorphConfig {
    field: String,
    morph_mapper: MorphMapperConfig,
    #[serde(default)]
    optional_values: Vec<Value>,
}

#[derive(Clone, Serialize, Deserialize)]
struct MatcherConfig {
    #[serde(default)]
    on: IndexMap<String, Ingredient>,
    #[serde(default)]
    patterns: IndexMap<String, Ingredient>,
    #[serde(default)]
    default: Option<Ingredient>,
}

#[derive(Clone, Serialize, Deserialize)]
struct MatchConfig {
    field: String,
    matcher: MatcherConfig,
}

#[derive(Clone, Serialize, Deserialize)]
struct JsonConfig {
    json_recipe: JsonRecipe,
}

#[derive(Clone, Serialize, Deserialize)]
struct CircularConfig {
    ingredient: Ingredient,
    fallback: Ingredient,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "SCREAMING_SNAKE_CASE")]
enum WireIngredient {
    Value(EmptyConfig),
    Ref(RefConfig),
    Raw(RawConfig),
    Morph(MorphConfig),
    Match(MatchConfig),
    Json(JsonConfig),
    Circular(CircularConfig),
}

impl TryFrom<WireIngredient> for Ingredient {
    type Error = RecipeError;

    fn try_from(wire: WireIngredient) -> Result<Self, Self::Error> {
        Ok(match wire {
            WireIngredient::Value(_) => Self::Value,
            WireIngredient::Ref(config) => Self::Ref {
                ref_type: config.ref_type,
                optional: config.optional_values,
            },
            WireIngredient::Raw(config) => Self::Raw(config.value),
            WireIngredient::Morph(config) => Self::Morph(MorphIngredient {
                field: config.field,
                morph_map: config.morph_mapper.morph_map,
                optional: config.optional_values,
            }),
            WireIngredient::Match(config) => {
                let patterns = config
                    .matcher
                    .patterns
                    .into_iter()
                    .map(|(pattern, ingredient)| Ok((Pattern::parse(pattern)?, ingredient)))
                    .collect::<Result<_, RecipeError>>()?;
                Self::Match(MatchIngredient {
                    field: config.field,
                    on: config.matcher.on,
                    patterns,
                    default: config.matcher.default.map(Box::new),
                })
            }
            WireIngredient::Json(config) => Self::Json(config.json_recipe),
            WireIngredient::Circular(config) => Self::circular(config.ingredient, config.fallback),
        })
    }
}

impl From<Ingredient> for WireIngredient {
    fn from(ingredient: Ingredient) -> Self {
        match ingredient {
            Ingredient::Value => Self::Value(EmptyConfig {}),
            Ingredient::Ref { ref_type, optional } => Self::Ref(RefConfig {
                ref_type,
                optional_values: optional,
            }),
            Ingredient::Raw(value) => Self::Raw(RawConfig { value }),
            Ingredient::Morph(morph) => Self::Morph(MorphConfig {
                field: morph.field,
                morph_mapper: MorphMapperConfig {
                    morph_map: morph.morph_map,
                },
                optional_values: morph.optional,
            }),
            Ingredient::Match(matcher) => Self::Match(MatchConfig {
                field: matcher.field,
                matcher: MatcherConfig {
                    on: matcher.on,
                    patterns: matcher
                        .patterns
                        .into_iter()
                        .map(|(pattern, ingredient)| (pattern.as_str().to_string(), ingredient))
                        .collect(),
                    default: matcher.default.map(|default| *default),
                },
            }),
            Ingredient::Json(recipe) => Self::Json(JsonConfig { json_recipe: recipe }),
            Ingredient::Circular { real, fallback } => Self::Circular(CircularConfig {
                ingredient: *real,
                fallback: *fallback,
            }),
        }
    }
}
