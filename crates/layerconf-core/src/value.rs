//! Configuration value types
//!
//! Represents configuration trees as read from sources and as produced by
//! placeholder processing. Values can be scalars (string, int, float, bool,
//! null), sequences (arrays), or mappings (objects).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::path;

/// A configuration value that may contain unresolved placeholders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[derive(Default)]
pub enum Value {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// String value (may contain placeholders like %env(VAR)%)
    String(String),
    /// Sequence of values
    Sequence(Vec<Value>),
    /// Mapping of string keys to values
    Mapping(IndexMap<String, Value>),
}

impl Value {
    /// Create an empty mapping, the neutral element of [`Value::merge`]
    pub fn empty_mapping() -> Self {
        Value::Mapping(IndexMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Sequence(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Value::Mapping(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        if let Value::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Integer(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        if let Value::Sequence(seq) = self {
            Some(seq.as_slice())
        } else {
            None
        }
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Value>> {
        if let Value::Mapping(map) = self {
            Some(map)
        } else {
            None
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        if let Value::Mapping(map) = self {
            Some(map)
        } else {
            None
        }
    }

    /// Get a value by dotted path (e.g., "database.host" or "\"a.b\".c")
    pub fn get_path(&self, path: &str) -> Result<&Value> {
        path::get(self, path)
    }

    /// Returns the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
        }
    }

    /// Textual form used when a value is embedded into a larger string
    ///
    /// Null becomes the empty string. Sequences and mappings cannot be
    /// embedded.
    pub fn to_text(&self) -> Result<String> {
        match self {
            Value::Null => Ok(String::new()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::String(s) => Ok(s.clone()),
            Value::Sequence(_) | Value::Mapping(_) => {
                Err(Error::type_coercion("string", self.type_name()))
            }
        }
    }

    /// Truthiness used by the `bool` cast
    ///
    /// Null, false, zero, the empty string, "0", "false" (any case) and empty
    /// collections are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
            Value::Sequence(seq) => !seq.is_empty(),
            Value::Mapping(map) => !map.is_empty(),
        }
    }

    /// Deep merge `other` into this value
    ///
    /// Two mappings merge key by key, recursively. In every other case
    /// `other` replaces the current value, so sequences are replaced rather
    /// than concatenated and an explicit null clears the base.
    pub fn merge(&mut self, other: Value) {
        match (self, other) {
            (Value::Mapping(base), Value::Mapping(overlay)) => {
                for (key, overlay_value) in overlay {
                    if let Some(base_value) = base.get_mut(&key) {
                        base_value.merge(overlay_value);
                    } else {
                        base.insert(key, overlay_value);
                    }
                }
            }
            (this, other) => {
                *this = other;
            }
        }
    }

    /// Owned form of [`merge`](Self::merge)
    pub fn merged(mut self, other: Value) -> Value {
        self.merge(other);
        self
    }
}

/// Compact single-line rendering, used in logs and error messages
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Sequence(seq) => {
                let items: Vec<String> = seq.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Mapping(map) => {
                let entries: Vec<String> =
                    map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Value::Null => f.write_str("null"),
            scalar => match scalar.to_text() {
                Ok(text) => f.write_str(&text),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(m: IndexMap<String, Value>) -> Self {
        Value::Mapping(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_accessors_follow_yaml_types() {
        let v = yaml("port: 5432\nratio: 0.5\ndebug: true\nname: app\nhosts: [a]\nunset: ~\n");

        assert_eq!(v.get_path("port").unwrap().as_i64(), Some(5432));
        assert_eq!(v.get_path("port").unwrap().as_f64(), Some(5432.0));
        assert_eq!(v.get_path("ratio").unwrap().type_name(), "float");
        assert_eq!(v.get_path("debug").unwrap().as_bool(), Some(true));
        assert!(v.get_path("name").unwrap().is_string());
        assert!(v.get_path("hosts").unwrap().is_sequence());
        assert!(v.get_path("unset").unwrap().is_null());
        assert!(v.as_mapping().is_some_and(|m| m.len() == 6));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Null.to_text().unwrap(), "");
        assert_eq!(Value::Bool(false).to_text().unwrap(), "false");
        assert_eq!(Value::Integer(-3).to_text().unwrap(), "-3");
        assert_eq!(Value::Float(1.25).to_text().unwrap(), "1.25");
        assert!(Value::empty_mapping().to_text().is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from("0").is_truthy());
        assert!(!Value::from("FALSE").is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Sequence(vec![]).is_truthy());
        assert!(Value::from("yes").is_truthy());
        assert!(Value::from("1").is_truthy());
        assert!(Value::Float(0.1).is_truthy());
    }

    #[test]
    fn test_merge_into_empty_mapping() {
        let merged = Value::empty_mapping().merged(yaml("a: 1"));
        assert_eq!(merged, yaml("a: 1"));
    }

    #[test]
    fn test_merge_deep() {
        let mut base = yaml("database:\n  host: localhost\n  port: 5432\n");
        base.merge(yaml("database:\n  host: prod-db\n"));

        assert_eq!(
            base,
            yaml("database:\n  host: prod-db\n  port: 5432\n")
        );
    }

    #[test]
    fn test_merge_null_overrides() {
        let mut base = yaml("feature:\n  enabled: true\n  config: value\n");
        base.merge(yaml("feature:\n  config: null\n"));

        assert_eq!(base.get_path("feature.config").unwrap(), &Value::Null);
        assert_eq!(
            base.get_path("feature.enabled").unwrap().as_bool(),
            Some(true)
        );
    }

    #[test]
    fn test_merge_array_replaces() {
        let mut base = yaml("servers: [a, b]\n");
        base.merge(yaml("servers: [c]\n"));

        let servers = base.get_path("servers").unwrap().as_sequence().unwrap();
        assert_eq!(servers, &[Value::from("c")]);
    }

    #[test]
    fn test_merge_type_mismatch() {
        let mut base = yaml("database:\n  host: localhost\n");
        base.merge(yaml("database: connection-string\n"));

        assert_eq!(
            base.get_path("database").unwrap().as_str(),
            Some("connection-string")
        );
    }

    #[test]
    fn test_merge_is_associative() {
        let a = yaml("x: {a: 1, b: 1}\nlist: [1]\n");
        let b = yaml("x: {b: 2, c: 2}\nlist: [2, 2]\n");
        let c = yaml("x: {c: 3}\ny: 3\n");

        let sequential = Value::empty_mapping()
            .merged(a.clone())
            .merged(b.clone())
            .merged(c.clone());
        let grouped = a.merged(b.merged(c));

        assert_eq!(sequential, grouped);
        assert_eq!(sequential, yaml("x: {a: 1, b: 2, c: 3}\nlist: [2, 2]\ny: 3\n"));
    }
}
