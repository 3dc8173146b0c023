#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::key_text;
use crate::pattern::{Pattern, PatternError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    #[serde(rename = "NON_ZERO_INT")]
    NonZeroInt,
    #[serde(rename = "TRUTHY")]
    Truthy,
    #[serde(rename = "REGEXP")]
    RegExp,
    #[serde(rename = "NONE")]
    None,
}

/// Decides whether a field value is a reference to another row.
#[derive(Clone, Debug, PartialEq)]
pub enum RelationCondition {
    NonZeroInt,
    Truthy,
    RegExp(Pattern),
    None,
}

impl RelationCondition {
    pub fn from_parts(kind: ConditionKind, matcher: &str) -> Result<Self, PatternError> {
        Ok(match kind {
            ConditionKind::NonZeroInt => Self::NonZeroInt,
            ConditionKind::Truthy => Self::Truthy,
            ConditionKind::RegExp => Self::RegExp(Pattern::parse(matcher)?),
            ConditionKind::None => Self::None,
        })
    }

    pub fn kind(&self) -> ConditionKind {
        match self {
            Self::NonZeroInt => ConditionKind::NonZeroInt,
            Self::Truthy => ConditionKind::Truthy,
            Self::RegExp(_) => ConditionKind::RegExp,
            Self::None => ConditionKind::None,
        }
    }

    pub fn matcher(&self) -> &str {
        match self {
            Self::RegExp(pattern) => pattern.as_str(),
            _ => "",
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::NonZeroInt => value.as_i64().is_some_and(|int| int > 0),
            Self::Truthy => is_truthy(value),
            Self::RegExp(pattern) => pattern.is_match(&key_text(value)),
            Self::None => true,
        }
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|float| float != 0.0),
        Value::String(text) => !text.is_empty() && text != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Whole-string numeric check: optional sign, digits, optional fraction and exponent.
pub fn is_numeric(text: &str) -> bool {
    let text = text.trim_start();
    !text.is_empty() && numeric_prefix(text).len() == text.len() && text.parse::<f64>().is_ok()
}

/// Integer conversion that reads the leading numeric part of strings.
pub fn to_integer(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(flag) => i64::from(*flag),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64))
            .unwrap_or(0),
        Value::String(text) => {
            let prefix = numeric_prefix(text.trim_start());
            prefix
                .parse::<i64>()
                .ok()
                .or_else(|| prefix.parse::<f64>().ok().map(|float| float as i64))
                .unwrap_or(0)
        }
        Value::Array(items) => i64::from(!items.is_empty()),
        Value::Object(map) => i64::from(!map.is_empty()),
    }
}

pub fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(text) => numeric_prefix(text.trim_start()).parse().unwrap_or(0.0),
        other => to_integer(other) as f64,
    }
}

fn numeric_prefix(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut has_digits = end > digits_start;
    if bytes.get(end) == Some(&b'.') {
        let fraction_start = end + 1;
        let mut cursor = fraction_start;
        while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
            cursor += 1;
        }
        if cursor > fraction_start || has_digits {
            has_digits = has_digits || cursor > fraction_start;
            end = cursor;
        }
    }
    if !has_digits {
        return "";
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut cursor = end + 1;
        if matches!(bytes.get(cursor), Some(b'+' | b'-')) {
            cursor += 1;
        }
        let exponent_start = cursor;
        while bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
            cursor += 1;
        }
        if cursor > exponent_start {
            end = cursor;
        }
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_zero_int_only_accepts_positive_integers() {
        let condition = RelationCondition::NonZeroInt;
        assert!(condition.accepts(&json!(3)));
        assert!(!condition.accepts(&json!(0)));
        assert!(!condition.accepts(&json!("3")));
        assert!(!condition.accepts(&Value::Null));
    }

    #[test]
    fn regexp_condition_matches_key_text() {
        let condition = RelationCondition::from_parts(ConditionKind::RegExp, r"/^\d+$/").unwrap();
        assert!(condition.accepts(&json!(12)));
        assert!(condition.accepts(&json!("12")));
        assert!(!condition.accepts(&json!("x12")));
        assert_eq!(condition.matcher(), r"/^\d+$/");
    }

    #[test]
    fn truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!("0"), json!([])] {
            assert!(!is_truthy(&falsy), "{falsy}");
        }
        for truthy in [json!(1), json!("a"), json!([0]), json!({"a": 1})] {
            assert!(is_truthy(&truthy), "{truthy}");
        }
    }

    #[test]
    fn integer_conversion_reads_numeric_prefixes() {
        assert_eq!(to_integer(&json!("12abc")), 12);
        assert_eq!(to_integer(&json!("abc")), 0);
        assert_eq!(to_integer(&json!(" -7")), -7);
        assert_eq!(to_integer(&json!(3.9)), 3);
        assert_eq!(to_integer(&json!(true)), 1);
        assert_eq!(to_float(&json!("1.5e1x")), 15.0);
    }

    #[test]
    fn numeric_strings() {
        assert!(is_numeric("12"));
        assert!(is_numeric("-1.5"));
        assert!(!is_numeric("12a"));
        assert!(!is_numeric(""));
    }
}
