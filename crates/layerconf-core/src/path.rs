//! Dotted path access over configuration trees
//!
//! Paths are `.` separated. A segment wrapped in double quotes may contain
//! literal dots, so `"foo.bar".baz` addresses key `baz` below key `foo.bar`.
//! Numeric segments index into sequences.
//!
//! `set` and `remove` never mutate their input; they return a new tree.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::value::Value;

const SEPARATOR: char = '.';
const QUOTE: char = '"';

/// A parsed configuration path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigPath {
    segments: Vec<String>,
}

impl ConfigPath {
    /// Parse a dotted path string
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::invalid_path(path, "Path must not be empty"));
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;

        for c in path.chars() {
            match c {
                QUOTE => in_quotes = !in_quotes,
                SEPARATOR if !in_quotes => segments.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }

        if in_quotes {
            return Err(Error::invalid_path(path, "Unterminated quote in path"));
        }
        segments.push(current);

        Ok(Self { segments })
    }

    /// Build a path from already split segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// The individual segments
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether any segment is empty (`a..b`, `.a`, `a.`)
    pub fn has_empty_segment(&self) -> bool {
        self.segments.iter().any(String::is_empty)
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            if segment.contains(SEPARATOR) {
                write!(f, "{}{}{}", QUOTE, segment, QUOTE)?;
            } else {
                write!(f, "{}", segment)?;
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Mapping(map) => map.get(segment),
        Value::Sequence(seq) => segment.parse::<usize>().ok().and_then(|i| seq.get(i)),
        _ => None,
    }
}

/// Look up a path, failing with `PathNotFound` on a miss
pub fn get<'a>(tree: &'a Value, path: &str) -> Result<&'a Value> {
    let parsed = ConfigPath::parse(path)?;
    get_parsed(tree, &parsed)
}

/// Look up an already parsed path
pub fn get_parsed<'a>(tree: &'a Value, path: &ConfigPath) -> Result<&'a Value> {
    let mut current = tree;
    for segment in path.segments() {
        current = child(current, segment).ok_or_else(|| Error::path_not_found(path.to_string()))?;
    }
    Ok(current)
}

/// Look up a path, returning `default` on a miss
///
/// The default is returned as is, including `Value::Null`. Only a malformed
/// path is an error.
pub fn get_or(tree: &Value, path: &str, default: Value) -> Result<Value> {
    let parsed = ConfigPath::parse(path)?;
    Ok(get_parsed(tree, &parsed).cloned().unwrap_or(default))
}

/// Whether a path exists in the tree
pub fn contains(tree: &Value, path: &str) -> bool {
    ConfigPath::parse(path)
        .map(|parsed| get_parsed(tree, &parsed).is_ok())
        .unwrap_or(false)
}

/// Return a copy of `tree` with `value` stored at `path`
///
/// Intermediate mappings are created as needed; a scalar in the way is
/// replaced by a mapping.
pub fn set(tree: &Value, path: &str, value: Value) -> Result<Value> {
    let parsed = ConfigPath::parse(path)?;
    let mut result = tree.clone();
    set_parsed(&mut result, &parsed, value)?;
    Ok(result)
}

/// Store `value` at an already parsed path, in place
pub fn set_parsed(tree: &mut Value, path: &ConfigPath, value: Value) -> Result<()> {
    if path.segments.is_empty() || path.has_empty_segment() {
        return Err(Error::invalid_path(
            path.to_string(),
            "Path segments must not be empty",
        ));
    }
    set_in(tree, path.segments(), value, path)
}

/// Sequences accept existing indexes and the index one past the end
fn set_in(node: &mut Value, segments: &[String], value: Value, path: &ConfigPath) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };

    if let Value::Sequence(seq) = node {
        let index = match head.parse::<usize>() {
            Ok(i) if i <= seq.len() => i,
            _ => {
                return Err(Error::invalid_path(
                    path.to_string(),
                    format!(
                        "'{}' is not an index of a sequence with {} element(s)",
                        head,
                        seq.len()
                    ),
                ))
            }
        };
        if index == seq.len() {
            seq.push(Value::Null);
        }
        return set_in(&mut seq[index], rest, value, path);
    }

    if !node.is_mapping() {
        *node = Value::Mapping(IndexMap::new());
    }
    match node {
        Value::Mapping(map) => {
            let entry = map.entry(head.clone()).or_insert(Value::Null);
            set_in(entry, rest, value, path)
        }
        _ => Err(Error::internal("set target is not a mapping")),
    }
}

/// Return a copy of `tree` without the entry at `path`
pub fn remove(tree: &Value, path: &str) -> Result<Value> {
    let parsed = ConfigPath::parse(path)?;
    let mut result = tree.clone();
    if !remove_in(&mut result, parsed.segments()) {
        return Err(Error::path_not_found(parsed.to_string()));
    }
    Ok(result)
}

fn remove_in(node: &mut Value, segments: &[String]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return false;
    };

    match node {
        Value::Mapping(map) if rest.is_empty() => map.shift_remove(head).is_some(),
        Value::Mapping(map) => map
            .get_mut(head)
            .map(|next| remove_in(next, rest))
            .unwrap_or(false),
        Value::Sequence(seq) => match head.parse::<usize>() {
            Ok(i) if i < seq.len() && rest.is_empty() => {
                seq.remove(i);
                true
            }
            Ok(i) if i < seq.len() => remove_in(&mut seq[i], rest),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn tree() -> Value {
        serde_yaml::from_str(
            r#"
foo:
  bar: baz
"dotted.key":
  inner: 1
servers:
  - host: a
  - host: b
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_quoted_segments() {
        let path = ConfigPath::parse("\"foo.bar\".baz").unwrap();
        assert_eq!(path.segments(), &["foo.bar".to_string(), "baz".to_string()]);
        assert_eq!(path.to_string(), "\"foo.bar\".baz");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ConfigPath::parse("").unwrap_err().kind, ErrorKind::InvalidPath);
        assert_eq!(
            ConfigPath::parse("\"foo.bar").unwrap_err().kind,
            ErrorKind::InvalidPath
        );
    }

    #[test]
    fn test_get() {
        let t = tree();
        assert_eq!(get(&t, "foo.bar").unwrap().as_str(), Some("baz"));
        assert_eq!(get(&t, "\"dotted.key\".inner").unwrap().as_i64(), Some(1));
        assert_eq!(get(&t, "servers.1.host").unwrap().as_str(), Some("b"));
    }

    #[test]
    fn test_get_missing_without_default_fails() {
        let t = tree();
        let err = get(&t, "foo.nope").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathNotFound);
        assert_eq!(err.path.as_deref(), Some("foo.nope"));

        assert!(get(&t, "foo.bar.deeper").is_err());
        assert!(get(&t, "servers.7").is_err());
    }

    #[test]
    fn test_get_or_returns_default_even_null() {
        let t = tree();
        assert_eq!(get_or(&t, "missing", Value::Null).unwrap(), Value::Null);
        assert_eq!(
            get_or(&t, "missing.deep", Value::from("fallback")).unwrap(),
            Value::from("fallback")
        );
        assert_eq!(get_or(&t, "foo.bar", Value::Null).unwrap(), Value::from("baz"));
        assert!(get_or(&t, "", Value::Null).is_err());
    }

    #[test]
    fn test_set_then_get() {
        let t = tree();
        for path in ["foo.bar", "new.nested.key", "\"a.b\".c", "foo.bar.deeper"] {
            let updated = set(&t, path, Value::from(7)).unwrap();
            assert_eq!(get(&updated, path).unwrap(), &Value::from(7), "{}", path);
        }
        // input untouched
        assert_eq!(get(&t, "foo.bar").unwrap().as_str(), Some("baz"));
    }

    #[test]
    fn test_set_into_sequence() {
        let updated = set(&tree(), "servers.0.host", Value::from("z")).unwrap();
        assert_eq!(get(&updated, "servers.0.host").unwrap().as_str(), Some("z"));
        assert_eq!(get(&updated, "servers.1.host").unwrap().as_str(), Some("b"));
    }

    #[test]
    fn test_set_appends_past_last_index() {
        let updated = set(&tree(), "servers.2.host", Value::from("c")).unwrap();
        let hosts: Vec<_> = (0..3)
            .map(|i| get(&updated, &format!("servers.{}.host", i)).unwrap().as_str())
            .collect();
        assert_eq!(hosts, vec![Some("a"), Some("b"), Some("c")]);
    }

    #[test]
    fn test_set_out_of_range_keeps_sequence() {
        for path in ["servers.5.host", "servers.name"] {
            let err = set(&tree(), path, Value::from("c")).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidPath, "{}", path);
        }

        let mut t = tree();
        let parsed = ConfigPath::parse("servers.9").unwrap();
        assert!(set_parsed(&mut t, &parsed, Value::Null).is_err());
        assert_eq!(t, tree());
    }

    #[test]
    fn test_set_rejects_empty_segment() {
        for path in ["a..b", ".a", "a."] {
            let err = set(&tree(), path, Value::Null).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidPath, "{}", path);
        }
    }

    #[test]
    fn test_remove() {
        let t = tree();
        let updated = remove(&t, "foo.bar").unwrap();
        assert!(!contains(&updated, "foo.bar"));
        assert!(contains(&updated, "foo"));

        let updated = remove(&t, "servers.0").unwrap();
        assert_eq!(get(&updated, "servers.0.host").unwrap().as_str(), Some("b"));
    }

    #[test]
    fn test_remove_missing_fails() {
        let err = remove(&tree(), "foo.nope.deeper").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathNotFound);
    }
}
