//! Placeholder resolvers
//!
//! A resolver turns the accessor of a `%type(accessor)%` placeholder into a
//! value. Built-in resolvers:
//! - `env` - environment variable, read through an [`EnvSource`]
//! - `const` - named constant from the [`ResolverContext`]
//! - `conf` - dotted path into the reference tree being processed
//! - `global` - dotted path into the globals tree of the [`ResolverContext`]
//!
//! Resolvers are kept in a [`ResolverRegistry`] in registration order. The
//! first resolver supporting a type is authoritative for it.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::path::{self, ConfigPath};
use crate::placeholder::PlaceholderMatch;
use crate::value::Value;

/// Read access to environment variables
pub trait EnvSource: Send + Sync {
    /// Value of a single variable
    fn var(&self, name: &str) -> Option<String>;

    /// All variables, in no particular order
    fn vars(&self) -> Vec<(String, String)>;
}

/// The environment of the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }
}

/// A fixed set of variables, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    vars: IndexMap<String, String>,
}

impl StaticEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for StaticEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Inputs the built-in resolvers read from
#[derive(Clone)]
pub struct ResolverContext {
    env: Arc<dyn EnvSource>,
    constants: IndexMap<String, Value>,
    globals: Value,
}

impl Default for ResolverContext {
    fn default() -> Self {
        Self {
            env: Arc::new(ProcessEnv),
            constants: IndexMap::new(),
            globals: Value::empty_mapping(),
        }
    }
}

impl fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverContext")
            .field("constants", &self.constants)
            .field("globals", &self.globals)
            .finish_non_exhaustive()
    }
}

impl ResolverContext {
    /// Context reading the process environment, with no constants or globals
    pub fn new() -> Self {
        Self::default()
    }

    /// Read environment variables from `env` instead of the process
    pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Share an existing environment source
    pub fn with_env_source(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    /// Define a constant for `%const(NAME)%`
    pub fn with_constant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constants.insert(name.into(), value.into());
        self
    }

    /// Set the tree `%global(path)%` reads from
    pub fn with_globals(mut self, globals: Value) -> Self {
        self.globals = globals;
        self
    }

    pub fn env(&self) -> &Arc<dyn EnvSource> {
        &self.env
    }
}

/// Resolves the accessor of one or more placeholder types
pub trait PlaceholderResolver: Send + Sync {
    /// Type tags this resolver handles
    fn supported_types(&self) -> Vec<String>;

    /// Whether this resolver handles `placeholder_type`
    fn supports(&self, placeholder_type: &str) -> bool {
        self.supported_types().iter().any(|t| t == placeholder_type)
    }

    /// Whether the accessor has a target; `false` declines the placeholder
    fn can_resolve(&self, accessor: &str, reference: &Value) -> bool;

    /// The value the accessor refers to
    fn resolve_value(&self, accessor: &str, reference: &Value) -> Result<Value>;

    /// Whether exported trees keep this placeholder dynamic
    fn exportable(&self) -> bool {
        false
    }

    /// Text standing in for the placeholder in an exported tree
    fn resolve_as_static_expression(
        &self,
        _placeholder: &PlaceholderMatch,
        _reference: &Value,
    ) -> Option<String> {
        None
    }
}

/// `%env(NAME)%`
pub struct EnvResolver {
    env: Arc<dyn EnvSource>,
}

impl EnvResolver {
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self { env }
    }
}

impl PlaceholderResolver for EnvResolver {
    fn supported_types(&self) -> Vec<String> {
        vec!["env".into()]
    }

    fn can_resolve(&self, accessor: &str, _reference: &Value) -> bool {
        self.env.var(accessor).is_some()
    }

    fn resolve_value(&self, accessor: &str, _reference: &Value) -> Result<Value> {
        self.env
            .var(accessor)
            .map(Value::String)
            .ok_or_else(|| Error::placeholder_unresolvable(format!("%env({})%", accessor)))
    }

    fn exportable(&self) -> bool {
        true
    }

    fn resolve_as_static_expression(
        &self,
        placeholder: &PlaceholderMatch,
        _reference: &Value,
    ) -> Option<String> {
        Some(placeholder.raw.clone())
    }
}

/// `%const(NAME)%`
pub struct ConstResolver {
    constants: IndexMap<String, Value>,
}

impl ConstResolver {
    pub fn new(constants: IndexMap<String, Value>) -> Self {
        Self { constants }
    }
}

impl PlaceholderResolver for ConstResolver {
    fn supported_types(&self) -> Vec<String> {
        vec!["const".into()]
    }

    fn can_resolve(&self, accessor: &str, _reference: &Value) -> bool {
        self.constants.contains_key(accessor)
    }

    fn resolve_value(&self, accessor: &str, _reference: &Value) -> Result<Value> {
        self.constants
            .get(accessor)
            .cloned()
            .ok_or_else(|| Error::placeholder_unresolvable(format!("%const({})%", accessor)))
    }

    fn exportable(&self) -> bool {
        true
    }

    fn resolve_as_static_expression(
        &self,
        placeholder: &PlaceholderMatch,
        _reference: &Value,
    ) -> Option<String> {
        Some(placeholder.raw.clone())
    }
}

/// `%conf(path)%`, looked up in the reference tree
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfResolver;

impl PlaceholderResolver for ConfResolver {
    fn supported_types(&self) -> Vec<String> {
        vec!["conf".into()]
    }

    fn can_resolve(&self, accessor: &str, reference: &Value) -> bool {
        path::get(reference, accessor).is_ok()
    }

    fn resolve_value(&self, accessor: &str, reference: &Value) -> Result<Value> {
        path::get(reference, accessor).cloned()
    }
}

/// `%global(path)%`, looked up in a globals tree
pub struct GlobalResolver {
    globals: Value,
}

impl GlobalResolver {
    pub fn new(globals: Value) -> Self {
        Self { globals }
    }
}

impl PlaceholderResolver for GlobalResolver {
    fn supported_types(&self) -> Vec<String> {
        vec!["global".into()]
    }

    fn can_resolve(&self, accessor: &str, _reference: &Value) -> bool {
        path::get(&self.globals, accessor).is_ok()
    }

    fn resolve_value(&self, accessor: &str, _reference: &Value) -> Result<Value> {
        path::get(&self.globals, accessor).cloned()
    }

    fn exportable(&self) -> bool {
        true
    }

    fn resolve_as_static_expression(
        &self,
        placeholder: &PlaceholderMatch,
        _reference: &Value,
    ) -> Option<String> {
        let canonical = ConfigPath::parse(&placeholder.accessor).ok()?;
        Some(placeholder.render_with_accessor(&canonical.to_string()))
    }
}

/// A closure-based resolver for a single type
///
/// The closure receives the accessor and the reference tree. Returning an
/// error declines the placeholder.
pub struct FnResolver<F>
where
    F: Fn(&str, &Value) -> Result<Value> + Send + Sync,
{
    placeholder_type: String,
    func: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&str, &Value) -> Result<Value> + Send + Sync,
{
    /// Create a new function-based resolver
    pub fn new(placeholder_type: impl Into<String>, func: F) -> Self {
        Self {
            placeholder_type: placeholder_type.into(),
            func,
        }
    }
}

impl<F> PlaceholderResolver for FnResolver<F>
where
    F: Fn(&str, &Value) -> Result<Value> + Send + Sync,
{
    fn supported_types(&self) -> Vec<String> {
        vec![self.placeholder_type.clone()]
    }

    fn can_resolve(&self, accessor: &str, reference: &Value) -> bool {
        (self.func)(accessor, reference).is_ok()
    }

    fn resolve_value(&self, accessor: &str, reference: &Value) -> Result<Value> {
        (self.func)(accessor, reference)
    }
}

/// Ordered collection of placeholder resolvers
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: Vec<Arc<dyn PlaceholderResolver>>,
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("types", &self.supported_types())
            .finish()
    }
}

impl ResolverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in resolvers over the process environment, no constants or globals
    pub fn with_builtins() -> Self {
        Self::from_context(&ResolverContext::default())
    }

    /// Built-in resolvers (env, const, conf, global) reading from `ctx`
    pub fn from_context(ctx: &ResolverContext) -> Self {
        Self {
            resolvers: vec![
                Arc::new(EnvResolver::new(ctx.env.clone())),
                Arc::new(ConstResolver::new(ctx.constants.clone())),
                Arc::new(ConfResolver),
                Arc::new(GlobalResolver::new(ctx.globals.clone())),
            ],
        }
    }

    /// Register a resolver for types nobody claims yet
    pub fn register(&mut self, resolver: Arc<dyn PlaceholderResolver>) -> Result<()> {
        self.register_with_force(resolver, false)
    }

    /// Register a resolver with optional force overwrite.
    ///
    /// Without `force`, claiming a type another resolver already supports
    /// fails. With `force`, the resolver is placed first and becomes
    /// authoritative for all of its types.
    pub fn register_with_force(
        &mut self,
        resolver: Arc<dyn PlaceholderResolver>,
        force: bool,
    ) -> Result<()> {
        if force {
            self.resolvers.insert(0, resolver);
            return Ok(());
        }

        if let Some(claimed) = resolver
            .supported_types()
            .into_iter()
            .find(|t| self.resolver_for(t).is_some())
        {
            return Err(Error::resolver_already_registered(claimed));
        }
        self.resolvers.push(resolver);
        Ok(())
    }

    /// Register a closure as the resolver for `placeholder_type`
    pub fn register_fn<F>(&mut self, placeholder_type: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(&str, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnResolver::new(placeholder_type, func)))
    }

    /// The authoritative resolver for a type
    pub fn resolver_for(&self, placeholder_type: &str) -> Option<&Arc<dyn PlaceholderResolver>> {
        self.resolvers.iter().find(|r| r.supports(placeholder_type))
    }

    /// Every supported type, in registration order, without duplicates
    pub fn supported_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for t in self.resolvers.iter().flat_map(|r| r.supported_types()) {
            if !types.contains(&t) {
                types.push(t);
            }
        }
        types
    }

    /// A registry holding only the resolvers matching `keep`
    pub fn filtered(&self, keep: impl Fn(&dyn PlaceholderResolver) -> bool) -> Self {
        Self {
            resolvers: self
                .resolvers
                .iter()
                .filter(|r| keep(r.as_ref()))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, PlaceholderErrorKind};
    use crate::placeholder::PlaceholderMatcher;
    use pretty_assertions::assert_eq;

    fn ctx() -> ResolverContext {
        ResolverContext::new()
            .with_env(StaticEnv::new().with_var("DB_HOST", "db.local"))
            .with_constant("APP_VERSION", "1.2.3")
            .with_globals(serde_yaml::from_str("app:\n  workers: '42'\n").unwrap())
    }

    #[test]
    fn test_env_resolver() {
        let registry = ResolverRegistry::from_context(&ctx());
        let env = registry.resolver_for("env").unwrap();
        let reference = Value::empty_mapping();

        assert!(env.can_resolve("DB_HOST", &reference));
        assert!(!env.can_resolve("MISSING", &reference));
        assert_eq!(
            env.resolve_value("DB_HOST", &reference).unwrap(),
            Value::from("db.local")
        );
        assert!(env.resolve_value("MISSING", &reference).is_err());
    }

    #[test]
    fn test_process_env_source() {
        std::env::set_var("LAYERCONF_RESOLVER_TEST_VAR", "test_value");
        assert_eq!(
            ProcessEnv.var("LAYERCONF_RESOLVER_TEST_VAR").as_deref(),
            Some("test_value")
        );
        assert!(ProcessEnv
            .vars()
            .iter()
            .any(|(k, _)| k == "LAYERCONF_RESOLVER_TEST_VAR"));
        std::env::remove_var("LAYERCONF_RESOLVER_TEST_VAR");
    }

    #[test]
    fn test_const_and_global_resolvers() {
        let registry = ResolverRegistry::from_context(&ctx());
        let reference = Value::empty_mapping();

        let constant = registry.resolver_for("const").unwrap();
        assert_eq!(
            constant.resolve_value("APP_VERSION", &reference).unwrap(),
            Value::from("1.2.3")
        );
        assert!(!constant.can_resolve("NOPE", &reference));

        let global = registry.resolver_for("global").unwrap();
        assert_eq!(
            global.resolve_value("app.workers", &reference).unwrap(),
            Value::from("42")
        );
        assert!(!global.can_resolve("app.missing", &reference));
    }

    #[test]
    fn test_conf_resolver_reads_reference() {
        let reference: Value = serde_yaml::from_str("foo:\n  bar: baz\n").unwrap();
        let conf = ConfResolver;

        assert!(conf.can_resolve("foo.bar", &reference));
        assert!(!conf.can_resolve("foo.baz", &reference));
        assert_eq!(
            conf.resolve_value("foo", &reference).unwrap(),
            serde_yaml::from_str::<Value>("bar: baz").unwrap()
        );
    }

    #[test]
    fn test_registry_supported_types() {
        let registry = ResolverRegistry::with_builtins();
        assert_eq!(registry.supported_types(), vec!["env", "const", "conf", "global"]);
    }

    #[test]
    fn test_register_fn() {
        let mut registry = ResolverRegistry::new();
        registry
            .register_fn("upper", |accessor, _| Ok(Value::from(accessor.to_uppercase())))
            .unwrap();

        let upper = registry.resolver_for("upper").unwrap();
        assert_eq!(
            upper.resolve_value("abc", &Value::Null).unwrap(),
            Value::from("ABC")
        );
    }

    #[test]
    fn test_register_claimed_type_fails_without_force() {
        let mut registry = ResolverRegistry::with_builtins();
        let err = registry
            .register_fn("env", |_, _| Ok(Value::from("fake")))
            .unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::Placeholder(PlaceholderErrorKind::AlreadyRegistered {
                placeholder_type: "env".into()
            })
        );
    }

    #[test]
    fn test_register_with_force_becomes_authoritative() {
        let mut registry = ResolverRegistry::with_builtins();
        registry
            .register_with_force(
                Arc::new(FnResolver::new("env", |_, _| Ok(Value::from("fake")))),
                true,
            )
            .unwrap();

        let env = registry.resolver_for("env").unwrap();
        assert_eq!(
            env.resolve_value("ANYTHING", &Value::Null).unwrap(),
            Value::from("fake")
        );
        assert_eq!(registry.supported_types(), vec!["env", "const", "conf", "global"]);
    }

    #[test]
    fn test_static_expressions() {
        let registry = ResolverRegistry::from_context(&ctx());
        let matcher = PlaceholderMatcher::default();
        let reference = Value::empty_mapping();

        let m = &matcher.extract_all("%env(DB_HOST)%", None).unwrap()[0];
        assert_eq!(
            registry
                .resolver_for("env")
                .unwrap()
                .resolve_as_static_expression(m, &reference),
            Some("%env(DB_HOST)%".to_string())
        );

        let m = &matcher.extract_all("%global(int:\"app\".workers)%", None).unwrap()[0];
        assert_eq!(
            registry
                .resolver_for("global")
                .unwrap()
                .resolve_as_static_expression(m, &reference),
            Some("%global(int:app.workers)%".to_string())
        );

        let m = &matcher.extract_all("%conf(a)%", None).unwrap()[0];
        assert_eq!(ConfResolver.resolve_as_static_expression(m, &reference), None);
    }

    #[test]
    fn test_filtered_registry() {
        let registry = ResolverRegistry::with_builtins();
        let inline_only = registry.filtered(|r| !r.exportable());
        assert_eq!(inline_only.supported_types(), vec!["conf"]);
    }
}
