//! Config processors and the placeholder engine
//!
//! A [`ConfigProcessor`] transforms a merged tree. The [`PlaceholderEngine`]
//! is the standard processor: it walks the tree depth first and replaces
//! every placeholder in values and keys using a [`ResolverRegistry`].
//!
//! `conf` placeholders read from a snapshot of the tree taken when
//! `process_config` starts, so resolution order never changes the outcome.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::placeholder::{PlaceholderMatch, PlaceholderMatcher};
use crate::resolver::{ResolverContext, ResolverRegistry};
use crate::value::Value;

/// Transforms a configuration tree after merging
pub trait ConfigProcessor: Send + Sync {
    fn process_config(&self, config: Value) -> Result<Value>;
}

impl<F> ConfigProcessor for F
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn process_config(&self, config: Value) -> Result<Value> {
        self(config)
    }
}

/// Resolves placeholders throughout a tree
///
/// In strict mode an unresolvable placeholder is an error. Otherwise a
/// placeholder that is the whole value becomes `null` and an embedded one
/// is dropped from its string.
#[derive(Debug, Clone)]
pub struct PlaceholderEngine {
    registry: ResolverRegistry,
    matcher: PlaceholderMatcher,
    strict: bool,
}

impl Default for PlaceholderEngine {
    fn default() -> Self {
        Self::new(ResolverRegistry::with_builtins(), true)
    }
}

impl PlaceholderEngine {
    pub fn new(registry: ResolverRegistry, strict: bool) -> Self {
        let matcher = PlaceholderMatcher::new(Some(registry.supported_types()));
        Self {
            registry,
            matcher,
            strict,
        }
    }

    /// Strict engine over the built-in resolvers reading from `ctx`
    pub fn from_context(ctx: &ResolverContext) -> Self {
        Self::new(ResolverRegistry::from_context(ctx), true)
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn registry(&self) -> &ResolverRegistry {
        &self.registry
    }
}

impl ConfigProcessor for PlaceholderEngine {
    fn process_config(&self, config: Value) -> Result<Value> {
        let mut session = Session {
            engine: self,
            reference: &config,
            in_flight: Vec::new(),
        };
        session.walk(&config, "")
    }
}

/// State of one `process_config` call
struct Session<'a> {
    engine: &'a PlaceholderEngine,
    reference: &'a Value,
    /// Placeholders currently being resolved, outermost first
    in_flight: Vec<String>,
}

fn child_path(parent: &str, segment: &str) -> String {
    let segment = if segment.contains('.') {
        format!("\"{}\"", segment)
    } else {
        segment.to_string()
    };
    if parent.is_empty() {
        segment
    } else {
        format!("{}.{}", parent, segment)
    }
}

impl Session<'_> {
    fn walk(&mut self, value: &Value, path: &str) -> Result<Value> {
        match value {
            Value::String(s) => self.resolve_string(s, path),
            Value::Mapping(map) => {
                let mut resolved = IndexMap::with_capacity(map.len());
                for (key, child) in map {
                    let key = self.resolve_key(key, path)?;
                    let child = self.walk(child, &child_path(path, &key))?;
                    resolved.insert(key, child);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(seq) => seq
                .iter()
                .enumerate()
                .map(|(i, item)| self.walk(item, &child_path(path, &i.to_string())))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other.clone()),
        }
    }

    fn resolve_key(&mut self, key: &str, path: &str) -> Result<String> {
        if !self.engine.matcher.contains_placeholder(key, None) {
            return Ok(key.to_string());
        }
        self.resolve_string(key, path)?
            .to_text()
            .map_err(|e| e.with_path(child_path(path, key)))
    }

    fn resolve_string(&mut self, s: &str, path: &str) -> Result<Value> {
        if !self.engine.matcher.contains_placeholder(s, None) {
            return Ok(Value::String(s.to_string()));
        }
        let engine = self.engine;
        let matches = engine.matcher.extract_all(s, None)?;

        if let [single] = matches.as_slice() {
            if single.direct {
                return Ok(self.resolve_match(single, path)?.unwrap_or(Value::Null));
            }
        }

        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for m in &matches {
            out.push_str(&s[last..m.span.start]);
            if let Some(value) = self.resolve_match(m, path)? {
                let text = value.to_text().map_err(|e| {
                    e.with_path(path).with_help(format!(
                        "{} resolves to a {} and cannot be embedded in a string",
                        m.raw,
                        value.type_name()
                    ))
                })?;
                out.push_str(&text);
            }
            last = m.span.end;
        }
        out.push_str(&s[last..]);

        Ok(Value::String(out))
    }

    /// `None` means the placeholder was skipped in non-strict mode
    fn resolve_match(&mut self, m: &PlaceholderMatch, path: &str) -> Result<Option<Value>> {
        if self.in_flight.contains(&m.raw) {
            let mut chain = self.in_flight.clone();
            chain.push(m.raw.clone());
            return Err(Error::recursion_detected(chain).with_path(path));
        }

        self.in_flight.push(m.raw.clone());
        let result = self.resolve_match_inner(m, path);
        self.in_flight.pop();
        result
    }

    fn resolve_match_inner(&mut self, m: &PlaceholderMatch, path: &str) -> Result<Option<Value>> {
        let engine = self.engine;
        let reference = self.reference;
        let resolver = engine
            .registry
            .resolver_for(&m.placeholder_type)
            .filter(|r| r.can_resolve(&m.accessor, reference));

        let Some(resolver) = resolver else {
            if engine.strict {
                return Err(Error::placeholder_unresolvable(&m.raw).with_path(path));
            }
            log::warn!("Could not resolve placeholder {} at '{}', skipping it", m.raw, path);
            return Ok(None);
        };

        log::trace!("Resolving {} at '{}'", m.raw, path);
        let raw = resolver
            .resolve_value(&m.accessor, reference)
            .map_err(|e| e.with_path(path))?;
        let resolved = self.walk(&raw, path)?;

        match m.cast {
            Some(cast) => cast
                .apply(resolved)
                .map(Some)
                .map_err(|e| e.with_path(path)),
            None => Ok(Some(resolved)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PlaceholderErrorKind};
    use crate::resolver::StaticEnv;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn engine_with_env(vars: &[(&str, &str)], strict: bool) -> PlaceholderEngine {
        let env: StaticEnv = vars.iter().copied().collect();
        PlaceholderEngine::new(
            ResolverRegistry::from_context(&ResolverContext::new().with_env(env)),
            strict,
        )
    }

    #[test]
    fn test_env_placeholders() {
        let engine = engine_with_env(&[("DB_HOST", "db.local"), ("DB_PORT", "5432")], true);
        let result = engine
            .process_config(yaml("db:\n  host: '%env(DB_HOST)%'\n  url: 'pg://%env(DB_HOST)%:%env(DB_PORT)%/app'\n"))
            .unwrap();

        assert_eq!(
            result,
            yaml("db:\n  host: db.local\n  url: pg://db.local:5432/app\n")
        );
    }

    #[test]
    fn test_env_value_resolved_recursively() {
        let engine = engine_with_env(&[("foo", "%env(bar)%"), ("bar", "baz")], true);
        let result = engine.process_config(yaml("value: '%env(foo)%'")).unwrap();
        assert_eq!(result, yaml("value: baz"));
    }

    #[test]
    fn test_global_int_cast() {
        let ctx = ResolverContext::new().with_globals(yaml("app:\n  workers: '42'\n"));
        let engine = PlaceholderEngine::from_context(&ctx);

        let result = engine
            .process_config(yaml("workers: '%global(int:app.workers)%'"))
            .unwrap();
        assert_eq!(result.get_path("workers").unwrap(), &Value::Integer(42));
    }

    #[test]
    fn test_direct_match_preserves_type() {
        let ctx = ResolverContext::new().with_constant("LIMITS", Value::from(vec![1, 2]));
        let engine = PlaceholderEngine::from_context(&ctx);

        let result = engine
            .process_config(yaml("limits: '%const(LIMITS)%'\ncopy: '%conf(limits)%'\n"))
            .unwrap();
        assert_eq!(result, yaml("limits: [1, 2]\ncopy: [1, 2]\n"));
    }

    #[test]
    fn test_conf_reads_snapshot_and_resolves_subtrees() {
        let engine = engine_with_env(&[("HOST", "example.org")], true);
        let result = engine
            .process_config(yaml(
                "base:\n  host: '%env(HOST)%'\n  port: 80\ncopy: '%conf(base)%'\nurl: 'http://%conf(base.host)%:%conf(base.port)%'\n",
            ))
            .unwrap();

        assert_eq!(
            result,
            yaml("base:\n  host: example.org\n  port: 80\ncopy:\n  host: example.org\n  port: 80\nurl: 'http://example.org:80'\n")
        );
    }

    #[test]
    fn test_quoted_conf_path() {
        let engine = PlaceholderEngine::default();
        let result = engine
            .process_config(yaml("'foo.bar':\n  baz: found\nvalue: '%conf(\"foo.bar\".baz)%'\n"))
            .unwrap();
        assert_eq!(result.get_path("value").unwrap().as_str(), Some("found"));
    }

    #[test]
    fn test_keys_are_resolved() {
        let engine = engine_with_env(&[("KEY", "name")], true);
        let result = engine
            .process_config(yaml("'%env(KEY)%': value\n'prefix_%env(KEY)%': other\n"))
            .unwrap();
        assert_eq!(result, yaml("name: value\nprefix_name: other\n"));
    }

    #[test]
    fn test_sequences_are_walked() {
        let engine = engine_with_env(&[("A", "1")], true);
        let result = engine
            .process_config(yaml("list:\n  - '%env(A)%'\n  - nested: 'x%env(A)%'\n"))
            .unwrap();
        assert_eq!(result, yaml("list:\n  - '1'\n  - nested: x1\n"));
    }

    #[test]
    fn test_conf_self_cycle_is_detected() {
        let engine = PlaceholderEngine::default();
        let err = engine
            .process_config(yaml("foo:\n  bar: '%conf(foo.bar)%'\n"))
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::RecursionDetected);
        assert_eq!(err.path.as_deref(), Some("foo.bar"));
    }

    #[test]
    fn test_conf_parent_cycle_is_detected() {
        let engine = PlaceholderEngine::default();
        let err = engine
            .process_config(yaml("foo:\n  bar: '%conf(foo)%'\n"))
            .unwrap_err();
        assert!(err.is_recursion());
    }

    #[test]
    fn test_env_cycle_is_detected() {
        let engine = engine_with_env(&[("recursion", "recursion=%env(recursion)%")], true);
        let err = engine
            .process_config(yaml("value: '%env(recursion)%'"))
            .unwrap_err();

        assert!(err.is_recursion());
        assert!(err.to_string().contains("%env(recursion)% → %env(recursion)%"));
    }

    #[test]
    fn test_same_placeholder_twice_is_not_a_cycle() {
        let engine = engine_with_env(&[("A", "a")], true);
        let result = engine
            .process_config(yaml("value: '%env(A)%-%env(A)%'\nother: '%env(A)%'\n"))
            .unwrap();
        assert_eq!(result, yaml("value: a-a\nother: a\n"));
    }

    #[test]
    fn test_strict_missing_fails() {
        let engine = engine_with_env(&[], true);
        let err = engine
            .process_config(yaml("db:\n  password: '%env(MISSING)%'\n"))
            .unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::Placeholder(PlaceholderErrorKind::Unresolvable {
                placeholder: "%env(MISSING)%".into()
            })
        );
        assert_eq!(err.path.as_deref(), Some("db.password"));
    }

    #[test]
    fn test_non_strict_direct_becomes_null() {
        let engine = engine_with_env(&[], false);
        let result = engine.process_config(yaml("value: '%env(MISSING)%'")).unwrap();
        assert_eq!(result, yaml("value: null"));
    }

    #[test]
    fn test_non_strict_embedded_is_removed() {
        let engine = engine_with_env(&[], false);
        let result = engine.process_config(yaml("value: 'is: %env(baz)%'")).unwrap();
        assert_eq!(result, yaml("value: 'is: '"));
    }

    #[test]
    fn test_unknown_type_left_verbatim() {
        let engine = engine_with_env(&[("A", "a")], true);
        let result = engine
            .process_config(yaml("value: '%foo(x)% %env(A)%'\nempty: '%env()%'\n"))
            .unwrap();
        assert_eq!(result, yaml("value: '%foo(x)% a'\nempty: '%env()%'\n"));
    }

    #[test]
    fn test_embedding_mapping_fails() {
        let engine = PlaceholderEngine::default();
        let err = engine
            .process_config(yaml("map:\n  a: 1\nvalue: 'x %conf(map)%'\n"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeCoercion);
        assert_eq!(err.path.as_deref(), Some("value"));
    }

    #[test]
    fn test_embedded_scalars_text_form() {
        let engine = PlaceholderEngine::default();
        let result = engine
            .process_config(yaml("n: null\nb: true\nf: 1.5\ntext: '[%conf(n)%|%conf(b)%|%conf(f)%]'\n"))
            .unwrap();
        assert_eq!(result.get_path("text").unwrap().as_str(), Some("[|true|1.5]"));
    }

    #[test]
    fn test_bool_cast() {
        let engine = engine_with_env(&[("OFF", "false"), ("ON", "yes")], true);
        let result = engine
            .process_config(yaml("off: '%env(bool:OFF)%'\non: '%env(bool:ON)%'\n"))
            .unwrap();
        assert_eq!(result, yaml("off: false\non: true\n"));
    }

    #[test]
    fn test_processing_is_idempotent() {
        let engine = engine_with_env(&[("HOST", "h")], true);
        let once = engine
            .process_config(yaml("a: '%env(HOST)%'\nb: '%conf(a)%'\nc: [1, '%conf(b)%']\n"))
            .unwrap();
        let twice = engine.process_config(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_closure_processor() {
        let add_flag = |config: Value| -> Result<Value> {
            crate::path::set(&config, "extra", Value::from(true))
        };
        let result = add_flag.process_config(yaml("a: 1")).unwrap();
        assert_eq!(result, yaml("a: 1\nextra: true\n"));
    }
}
