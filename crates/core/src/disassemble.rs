#![forbid(unsafe_code)]

//! Splits the JSON encoding of a value into literal fragments and token
//! occurrences.
//!
//! Tokens match whole scalars outside strings, whole string values, or plain
//! substrings of string values. Object keys are never split.

use serde_json::Value;

use crate::error::ValueError;
use crate::value::{AssemblyPart, Cast, PartKind, plain_text};

#[derive(Clone, Copy, Debug)]
struct StringSpan {
    // Byte offsets of the opening and closing quotes.
    open: usize,
    close: usize,
    is_key: bool,
}

struct Token<'a> {
    value: &'a Value,
    repr: String,
    is_string: bool,
    // An escaped string can only be matched as a whole string value.
    plain: bool,
}

#[derive(Clone, Copy)]
enum Site {
    Outside,
    WholeString(StringSpan),
    InsideString,
}

struct Hit<'a> {
    start: usize,
    end: usize,
    token: &'a Token<'a>,
    site: Site,
}

pub fn disassemble(value: &Value, tokens: &[Value]) -> Result<Vec<AssemblyPart>, ValueError> {
    let encoded = value.to_string();
    let spans = scan_strings(&encoded);
    let tokens = prepare_tokens(tokens)?;

    let mut parts = Vec::new();
    let mut cursor = 0;
    while let Some(hit) = next_hit(&encoded, &spans, &tokens, cursor) {
        let (literal_end, resume) = match hit.site {
            Site::WholeString(span) => (span.open, span.close + 1),
            Site::Outside | Site::InsideString => (hit.start, hit.end),
        };
        push_literal(&mut parts, &encoded[cursor..literal_end]);
        let cast = match hit.site {
            Site::InsideString => Cast::None,
            Site::Outside | Site::WholeString(_) => Cast::Json,
        };
        parts.push(AssemblyPart::alias(hit.token.value.clone(), cast));
        cursor = resume;
    }
    push_literal(&mut parts, &encoded[cursor..]);
    Ok(parts)
}

/// Concatenates disassembled parts back into JSON text.
pub fn reassemble(parts: &[AssemblyPart]) -> String {
    let mut out = String::new();
    for part in parts {
        match (part.kind(), part.cast()) {
            (PartKind::Part, _) => out.push_str(&plain_text(part.payload())),
            (PartKind::Alias, Cast::Json) => out.push_str(&part.payload().to_string()),
            (PartKind::Alias, Cast::None) => out.push_str(&plain_text(part.payload())),
        }
    }
    out
}

fn push_literal(parts: &mut Vec<AssemblyPart>, text: &str) {
    if !text.is_empty() {
        parts.push(AssemblyPart::literal(text));
    }
}

fn prepare_tokens(tokens: &[Value]) -> Result<Vec<Token<'_>>, ValueError> {
    let mut out: Vec<Token<'_>> = Vec::new();
    for value in tokens {
        let token = match value {
            Value::String(text) => {
                let quoted = value.to_string();
                let repr = quoted[1..quoted.len() - 1].to_string();
                let plain = repr == *text;
                Token {
                    value,
                    repr,
                    is_string: true,
                    plain,
                }
            }
            Value::Number(_) | Value::Bool(_) | Value::Null => Token {
                value,
                repr: value.to_string(),
                is_string: false,
                plain: true,
            },
            other => return Err(ValueError::InvalidToken(other.to_string())),
        };
        if token.repr.is_empty() || out.iter().any(|seen| seen.value == value) {
            continue;
        }
        out.push(token);
    }
    Ok(out)
}

fn scan_strings(encoded: &str) -> Vec<StringSpan> {
    let bytes = encoded.as_bytes();
    let mut spans = Vec::new();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] != b'"' {
            index += 1;
            continue;
        }
        let open = index;
        index += 1;
        while index < bytes.len() && bytes[index] != b'"' {
            if bytes[index] == b'\\' {
                index += 1;
            }
            index += 1;
        }
        let close = index.min(bytes.len().saturating_sub(1));
        let next = bytes[close + 1..]
            .iter()
            .find(|byte| !byte.is_ascii_whitespace());
        spans.push(StringSpan {
            open,
            close,
            is_key: next == Some(&b':'),
        });
        index = close + 1;
    }
    spans
}

fn next_hit<'a>(
    encoded: &str,
    spans: &[StringSpan],
    tokens: &'a [Token<'a>],
    cursor: usize,
) -> Option<Hit<'a>> {
    let mut best: Option<Hit<'a>> = None;
    for token in tokens {
        let Some(hit) = first_hit(encoded, spans, token, cursor) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some(current) => {
                hit.start < current.start
                    || (hit.start == current.start && hit.end - hit.start > current.end - current.start)
            }
        };
        if better {
            best = Some(hit);
        }
    }
    best
}

fn first_hit<'a>(
    encoded: &str,
    spans: &[StringSpan],
    token: &'a Token<'a>,
    cursor: usize,
) -> Option<Hit<'a>> {
    let mut from = cursor;
    while let Some(offset) = encoded[from..].find(&token.repr) {
        let start = from + offset;
        let end = start + token.repr.len();
        if let Some(site) = classify(encoded, spans, token, start, end) {
            return Some(Hit {
                start,
                end,
                token,
                site,
            });
        }
        from = start + encoded[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

fn classify(
    encoded: &str,
    spans: &[StringSpan],
    token: &Token<'_>,
    start: usize,
    end: usize,
) -> Option<Site> {
    let containing = spans
        .iter()
        .find(|span| span.open <= start && start <= span.close);
    match containing {
        Some(span) => {
            if span.is_key || start == span.open || end > span.close {
                return None;
            }
            if token.is_string && start == span.open + 1 && end == span.close {
                return Some(Site::WholeString(*span));
            }
            if !token.plain || !has_boundaries(encoded, token, start, end) {
                return None;
            }
            Some(Site::InsideString)
        }
        None => {
            if token.is_string {
                return None;
            }
            // A scalar outside strings must not run into a string.
            if spans.iter().any(|span| start < span.open && span.open < end) {
                return None;
            }
            has_boundaries(encoded, token, start, end).then_some(Site::Outside)
        }
    }
}

fn has_boundaries(encoded: &str, token: &Token<'_>, start: usize, end: usize) -> bool {
    if token.is_string {
        return true;
    }
    let bytes = encoded.as_bytes();
    let before = start.checked_sub(1).map(|index| bytes[index]);
    let after = bytes.get(end).copied();
    match token.value {
        Value::Number(_) => {
            !matches!(before, Some(b'0'..=b'9' | b'.' | b'-'))
                && !matches!(after, Some(b'0'..=b'9' | b'.' | b'e' | b'E'))
        }
        _ => {
            !before.is_some_and(|byte| byte.is_ascii_alphanumeric())
                && !after.is_some_and(|byte| byte.is_ascii_alphanumeric())
        }
    }
}
