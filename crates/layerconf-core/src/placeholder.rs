//! Placeholder parsing
//!
//! Extracts placeholder expressions from string values:
//! - `%env(DB_HOST)%` - resolver type with accessor
//! - `%global(int:app.workers)%` - with a cast applied after resolution
//! - `http://%env(HOST)%:%env(PORT)%/` - several placeholders embedded in text
//!
//! The type is one or more lowercase ASCII letters; the accessor is one or
//! more characters, none of which is `)`. `%env()%` is not a placeholder.

use std::fmt;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::value::Value;

/// Conversion applied to a resolved placeholder value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    Int,
    Bool,
    String,
    Float,
}

impl Cast {
    /// Parse a cast name as written before the `:` in an accessor
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Cast::Int),
            "bool" => Some(Cast::Bool),
            "string" => Some(Cast::String),
            "float" => Some(Cast::Float),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Cast::Int => "int",
            Cast::Bool => "bool",
            Cast::String => "string",
            Cast::Float => "float",
        }
    }

    /// Convert a resolved value
    pub fn apply(&self, value: Value) -> Result<Value> {
        match self {
            Cast::Int => to_int(&value).map(Value::Integer),
            Cast::Float => to_float(&value).map(Value::Float),
            Cast::Bool => Ok(Value::Bool(value.is_truthy())),
            Cast::String => value.to_text().map(Value::String),
        }
    }
}

impl fmt::Display for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("string (\"{}\")", s),
        other => other.type_name().to_string(),
    }
}

fn to_int(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Null => Ok(0),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
                .ok_or_else(|| Error::type_coercion("integer", describe(value)))
        }
        _ => Err(Error::type_coercion("integer", describe(value))),
    }
}

fn to_float(value: &Value) -> Result<f64> {
    match value {
        Value::Integer(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::type_coercion("float", describe(value))),
        _ => Err(Error::type_coercion("float", describe(value))),
    }
}

/// A placeholder found in a string value
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderMatch {
    /// The matched text, e.g. `%env(int:PORT)%`
    pub raw: String,
    /// Resolver type tag, e.g. `env`
    pub placeholder_type: String,
    /// Optional cast written before the accessor
    pub cast: Option<Cast>,
    /// Accessor with any cast prefix stripped
    pub accessor: String,
    /// Byte range of `raw` in the source string
    pub span: Range<usize>,
    /// The placeholder is the entire value
    pub direct: bool,
}

impl PlaceholderMatch {
    /// Canonical text for this placeholder with a replacement accessor
    pub fn render_with_accessor(&self, accessor: &str) -> String {
        match self.cast {
            Some(cast) => format!("%{}({}:{})%", self.placeholder_type, cast, accessor),
            None => format!("%{}({})%", self.placeholder_type, accessor),
        }
    }
}

/// Finds placeholders in values
#[derive(Debug, Clone, Default)]
pub struct PlaceholderMatcher {
    supported_types: Option<Vec<String>>,
}

impl PlaceholderMatcher {
    /// Create a matcher; `None` accepts every type
    pub fn new(supported_types: Option<Vec<String>>) -> Self {
        Self { supported_types }
    }

    fn effective_types<'a>(&'a self, allowed: Option<&'a [String]>) -> Option<&'a [String]> {
        allowed.or(self.supported_types.as_deref())
    }

    /// Whether `value` is a string holding at least one placeholder of an allowed type
    pub fn has_placeholders(&self, value: &Value, allowed: Option<&[String]>) -> bool {
        match value {
            Value::String(s) => self.contains_placeholder(s, allowed),
            _ => false,
        }
    }

    /// String form of [`has_placeholders`](Self::has_placeholders)
    pub fn contains_placeholder(&self, value: &str, allowed: Option<&[String]>) -> bool {
        let types = self.effective_types(allowed);
        scan(value).into_iter().any(|m| type_allowed(types, &m))
    }

    /// Every placeholder of an allowed type, left to right
    pub fn extract_all(&self, value: &str, allowed: Option<&[String]>) -> Result<Vec<PlaceholderMatch>> {
        let types = self.effective_types(allowed);
        let matches: Vec<_> = scan(value)
            .into_iter()
            .filter(|m| type_allowed(types, m))
            .collect();

        if matches.is_empty() {
            return Err(Error::malformed_placeholder(value));
        }
        Ok(matches)
    }
}

fn type_allowed(types: Option<&[String]>, m: &PlaceholderMatch) -> bool {
    types.is_none_or(|types| types.iter().any(|t| *t == m.placeholder_type))
}

/// Find all syntactically valid placeholders regardless of type
fn scan(input: &str) -> Vec<PlaceholderMatch> {
    let mut matches = Vec::new();
    let mut pos = 0;

    while let Some(offset) = input[pos..].find('%') {
        let start = pos + offset;
        match parse_at(input, start) {
            Some(m) => {
                pos = m.span.end;
                matches.push(m);
            }
            None => pos = start + 1,
        }
    }

    matches
}

/// Try to parse `%type(accessor)%` starting at the `%` at byte `start`
fn parse_at(input: &str, start: usize) -> Option<PlaceholderMatch> {
    let bytes = input.as_bytes();
    let mut pos = start + 1;

    let type_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_lowercase() {
        pos += 1;
    }
    if pos == type_start || bytes.get(pos) != Some(&b'(') {
        return None;
    }
    let placeholder_type = &input[type_start..pos];
    pos += 1;

    let accessor_start = pos;
    let close = input[accessor_start..].find(')')? + accessor_start;
    if close == accessor_start || bytes.get(close + 1) != Some(&b'%') {
        return None;
    }
    let end = close + 2;

    let inner = &input[accessor_start..close];
    let (cast, accessor) = match inner.split_once(':') {
        Some((name, rest)) if !rest.is_empty() => match Cast::from_name(name) {
            Some(cast) => (Some(cast), rest),
            None => (None, inner),
        },
        _ => (None, inner),
    };

    Some(PlaceholderMatch {
        raw: input[start..end].to_string(),
        placeholder_type: placeholder_type.to_string(),
        cast,
        accessor: accessor.to_string(),
        span: start..end,
        direct: start == 0 && end == input.len(),
    })
}
