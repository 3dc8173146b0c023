#![forbid(unsafe_code)]

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
#[error("invalid regular expression (pattern={pattern}): {message}")]
pub struct PatternError {
    pub pattern: String,
    pub message: String,
}

/// A regular expression written in delimited form (`/body/flags`).
///
/// Supported flags are `i`, `m`, `s`, `x` and `u`; `u` is accepted and ignored.
/// A pattern without a leading `/` is compiled as a bare body.
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn parse(source: impl Into<String>) -> Result<Self, PatternError> {
        let source = source.into();
        let (body, flags) = split_delimited(&source);
        let mut builder = RegexBuilder::new(body);
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                'u' => &mut builder,
                other => {
                    return Err(PatternError {
                        pattern: source.clone(),
                        message: format!("unsupported flag {other}"),
                    });
                }
            };
        }
        let regex = builder.build().map_err(|err| PatternError {
            pattern: source.clone(),
            message: err.to_string(),
        })?;
        Ok(Self { source, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }

    /// Whether `source` is written in delimited form.
    pub fn is_delimited(source: &str) -> bool {
        source.len() >= 2 && source.starts_with('/') && source[1..].contains('/')
    }
}

fn split_delimited(source: &str) -> (&str, &str) {
    if !Pattern::is_delimited(source) {
        return (source, "");
    }
    match source.rfind('/') {
        Some(end) if end > 0 => (&source[1..end], &source[end + 1..]),
        _ => (source, ""),
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::parse(source).map_err(serde::de::Error::custom)
    }
}
