//! Reader construction by resource type
//!
//! The [`ReaderFactory`] maps a resource string plus options onto a
//! [`ConfigReader`]. The type comes from the explicit `type` option or the
//! resource's file extension. Built-in types are `env`, `glob`, `json` and
//! `yaml` (`yml` is an alias of `yaml`).
//!
//! Relative file resources resolve against the factory's base path.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::import::{ImportStack, RootConfigReader};
use crate::reader::{
    ConfigReader, EnvironmentReader, ExcludedConfigReader, GlobFileReader, JsonFileReader,
    NestedConfigReader, YamlFileReader,
};
use crate::resolver::{EnvSource, ProcessEnv};
use crate::value::Value;

/// Builds a reader for a resource
pub type ReaderFn =
    Arc<dyn Fn(&str, &ReaderOptions, &ReaderFactory) -> Result<Box<dyn ConfigReader>> + Send + Sync>;

/// Options for building a reader
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderOptions {
    /// Explicit reader type; defaults to the resource's extension
    pub reader_type: Option<String>,
    /// Place the content under this path
    pub path: Option<String>,
    /// Remove these paths from the content
    pub exclude: Vec<String>,
    /// Any other keys, passed through to custom reader types
    pub extra: IndexMap<String, Value>,
}

impl ReaderOptions {
    pub fn with_type(mut self, reader_type: impl Into<String>) -> Self {
        self.reader_type = Some(reader_type.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_exclude(mut self, paths: Vec<String>) -> Self {
        self.exclude = paths;
        self
    }

    fn undecorated(&self) -> Self {
        Self {
            path: None,
            exclude: Vec::new(),
            ..self.clone()
        }
    }
}

#[derive(Clone)]
enum ReaderKind {
    Builder(ReaderFn),
    Alias(String),
}

/// Creates readers by type
#[derive(Clone)]
pub struct ReaderFactory {
    base_path: Option<PathBuf>,
    types: IndexMap<String, ReaderKind>,
    env: Arc<dyn EnvSource>,
    import_stack: ImportStack,
}

impl Default for ReaderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReaderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderFactory")
            .field("base_path", &self.base_path)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ReaderFactory {
    /// Factory with the built-in types and no base path
    pub fn new() -> Self {
        let mut factory = Self {
            base_path: None,
            types: IndexMap::new(),
            env: Arc::new(ProcessEnv),
            import_stack: ImportStack::default(),
        };
        factory.register_builtin_types();
        factory
    }

    fn register_builtin_types(&mut self) {
        self.register_reader_type("env", |resource, _options, factory| {
            Ok(Box::new(EnvironmentReader::new(resource, factory.env.clone())))
        });
        self.register_reader_type("glob", |resource, _options, factory| {
            let pattern = factory.make_absolute(resource)?;
            Ok(Box::new(GlobFileReader::new(
                pattern.display().to_string(),
                factory.clone(),
            )))
        });
        self.register_reader_type("json", |resource, _options, factory| {
            Ok(Box::new(JsonFileReader::new(factory.make_absolute(resource)?)))
        });
        self.register_reader_type("yaml", |resource, _options, factory| {
            Ok(Box::new(YamlFileReader::new(factory.make_absolute(resource)?)))
        });
        self.register_alias("yml", "yaml");
    }

    /// Resolve relative resources against `base_path`
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Read `env` resources from `env` instead of the process environment
    pub fn with_env_source(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// Register or replace a reader type
    pub fn register_reader_type<F>(&mut self, reader_type: impl Into<String>, builder: F)
    where
        F: Fn(&str, &ReaderOptions, &ReaderFactory) -> Result<Box<dyn ConfigReader>>
            + Send
            + Sync
            + 'static,
    {
        self.types
            .insert(reader_type.into(), ReaderKind::Builder(Arc::new(builder)));
    }

    /// Make `reader_type` build the same readers as `target`
    pub fn register_alias(&mut self, reader_type: impl Into<String>, target: impl Into<String>) {
        self.types
            .insert(reader_type.into(), ReaderKind::Alias(target.into()));
    }

    /// Whether a type (or alias) is registered
    pub fn supports_type(&self, reader_type: &str) -> bool {
        self.types.contains_key(reader_type)
    }

    /// Resolve a relative resource against the base path
    ///
    /// The result is lexically normalized, so one file always has one label
    /// no matter how many `..` hops led to it.
    pub fn make_absolute(&self, resource: &str) -> Result<PathBuf> {
        let path = Path::new(resource);
        if path.is_absolute() {
            return Ok(normalize(path));
        }
        match &self.base_path {
            Some(base) => Ok(normalize(&base.join(path))),
            None => Err(Error::io(resource, "Could not find resource")
                .with_help("Use an absolute path or give the factory a base path")),
        }
    }

    /// Build a plain reader, applying the `path` and `exclude` decorators
    pub fn create_reader(
        &self,
        resource: &str,
        options: &ReaderOptions,
    ) -> Result<Box<dyn ConfigReader>> {
        let reader = self.build_typed(resource, &options.undecorated())?;
        Ok(decorate(reader, options))
    }

    /// Build a root reader that also resolves the resource's `imports`
    ///
    /// Each root reader created here starts its own import session.
    pub fn create_root_reader(
        &self,
        resource: &str,
        options: &ReaderOptions,
    ) -> Result<Box<dyn ConfigReader>> {
        let session = Self {
            import_stack: ImportStack::default(),
            ..self.clone()
        };
        session.session_root_reader(resource, options)
    }

    /// Root reader sharing this factory's import session
    pub(crate) fn session_root_reader(
        &self,
        resource: &str,
        options: &ReaderOptions,
    ) -> Result<Box<dyn ConfigReader>> {
        let undecorated = options.undecorated();
        let reader_type = self.resolve_type(resource, &undecorated)?;

        let (label, import_factory) = if reader_type == "env" {
            (resource.to_string(), self.clone())
        } else {
            let absolute = self.make_absolute(resource)?;
            let import_factory = Self {
                base_path: absolute.parent().map(Path::to_path_buf),
                ..self.clone()
            };
            (absolute.display().to_string(), import_factory)
        };

        let inner = self.build_typed(&label, &undecorated)?;
        let root = RootConfigReader::new(label, inner, import_factory);
        Ok(decorate(Box::new(root), options))
    }

    pub(crate) fn import_stack(&self) -> &ImportStack {
        &self.import_stack
    }

    /// The registered type name after following aliases
    fn resolve_type(&self, resource: &str, options: &ReaderOptions) -> Result<String> {
        let mut reader_type = match &options.reader_type {
            Some(t) => t.clone(),
            None => Path::new(resource)
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let mut seen = Vec::new();
        loop {
            match self.types.get(&reader_type) {
                Some(ReaderKind::Builder(_)) => return Ok(reader_type),
                Some(ReaderKind::Alias(target)) => {
                    if seen.contains(&reader_type) {
                        seen.push(reader_type);
                        return Err(Error::recursion_detected(seen).with_resource(resource));
                    }
                    seen.push(reader_type);
                    reader_type = target.clone();
                }
                None => return Err(Error::unknown_reader_type(resource, reader_type)),
            }
        }
    }

    fn build_typed(&self, resource: &str, options: &ReaderOptions) -> Result<Box<dyn ConfigReader>> {
        let reader_type = self.resolve_type(resource, options)?;
        match self.types.get(&reader_type) {
            Some(ReaderKind::Builder(builder)) => {
                log::debug!("Creating {} reader for {}", reader_type, resource);
                builder(resource, options, self)
            }
            _ => Err(Error::internal(format!(
                "reader type '{}' resolved to a non-builder",
                reader_type
            ))),
        }
    }
}

/// Drop `.` components and fold `..` into the preceding directory
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(Component::ParentDir),
            },
            other => out.push(other),
        }
    }
    out
}

fn decorate(mut reader: Box<dyn ConfigReader>, options: &ReaderOptions) -> Box<dyn ConfigReader> {
    if let Some(path) = options.path.as_deref().filter(|p| !p.is_empty()) {
        reader = Box::new(NestedConfigReader::new(reader, path));
    }
    if !options.exclude.is_empty() {
        reader = Box::new(ExcludedConfigReader::new(reader, options.exclude.clone()));
    }
    reader
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ImportErrorKind};
    use crate::reader::ClosureConfigReader;
    use crate::resolver::StaticEnv;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_type_from_extension_and_alias() {
        let dir = temp_dir("layerconf_test_factory_types");
        std::fs::write(dir.join("a.yml"), "a: 1\n").unwrap();
        std::fs::write(dir.join("b.json"), r#"{"b": 2}"#).unwrap();

        let factory = ReaderFactory::new().with_base_path(&dir);
        let a = factory.create_reader("a.yml", &ReaderOptions::default()).unwrap();
        let b = factory.create_reader("b.json", &ReaderOptions::default()).unwrap();

        assert_eq!(a.read_config().unwrap(), yaml("a: 1"));
        assert_eq!(b.read_config().unwrap(), yaml("b: 2"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_explicit_type_overrides_extension() {
        let dir = temp_dir("layerconf_test_factory_explicit");
        std::fs::write(dir.join("settings.conf"), "a: 1\n").unwrap();

        let factory = ReaderFactory::new().with_base_path(&dir);
        let reader = factory
            .create_reader("settings.conf", &ReaderOptions::default().with_type("yaml"))
            .unwrap();
        assert_eq!(reader.read_config().unwrap(), yaml("a: 1"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_type() {
        let factory = ReaderFactory::new().with_base_path("/tmp");
        let err = factory
            .create_reader("settings.ini", &ReaderOptions::default())
            .err()
            .unwrap();
        assert_eq!(
            err.kind,
            ErrorKind::Import(ImportErrorKind::UnknownReaderType {
                reader_type: "ini".into()
            })
        );
    }

    #[test]
    fn test_relative_resource_without_base_path() {
        let err = ReaderFactory::new()
            .create_reader("config.yaml", &ReaderOptions::default())
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Io);
        assert!(err.to_string().contains("Could not find resource"));
    }

    #[test]
    fn test_make_absolute_normalizes() {
        let factory = ReaderFactory::new().with_base_path("/etc/app/sub");

        assert_eq!(
            factory.make_absolute("../a.yaml").unwrap(),
            PathBuf::from("/etc/app/a.yaml")
        );
        assert_eq!(
            factory.make_absolute("./x/../b.yaml").unwrap(),
            PathBuf::from("/etc/app/sub/b.yaml")
        );
        assert_eq!(
            factory.make_absolute("/etc/./app/../c.yaml").unwrap(),
            PathBuf::from("/etc/c.yaml")
        );
        assert_eq!(
            normalize(Path::new("../../d.yaml")),
            PathBuf::from("../../d.yaml")
        );
    }

    #[test]
    fn test_env_type() {
        let env = StaticEnv::new().with_var("APP__db__host", "h");
        let factory = ReaderFactory::new().with_env_source(Arc::new(env));
        let reader = factory
            .create_reader("APP", &ReaderOptions::default().with_type("env"))
            .unwrap();
        assert_eq!(reader.read_config().unwrap(), yaml("db:\n  host: h\n"));
    }

    #[test]
    fn test_custom_reader_type_and_alias() {
        let mut factory = ReaderFactory::new();
        factory.register_reader_type("inline", |resource, options, _factory| {
            let mut value = yaml(resource);
            if let Some(extra) = options.extra.get("marker") {
                value = crate::path::set(&value, "marker", extra.clone())?;
            }
            Ok(Box::new(ClosureConfigReader::new(move || Ok(value.clone()))))
        });
        factory.register_alias("literal", "inline");

        let mut options = ReaderOptions::default().with_type("literal");
        options.extra.insert("marker".into(), Value::from(true));

        let reader = factory.create_reader("a: 1", &options).unwrap();
        assert_eq!(reader.read_config().unwrap(), yaml("a: 1\nmarker: true\n"));
        assert!(factory.supports_type("literal"));
    }

    #[test]
    fn test_alias_cycle() {
        let mut factory = ReaderFactory::new();
        factory.register_alias("a", "b");
        factory.register_alias("b", "a");
        let err = factory
            .create_reader("x", &ReaderOptions::default().with_type("a"))
            .err()
            .unwrap();
        assert!(err.is_recursion());
    }

    #[test]
    fn test_path_and_exclude_decorators() {
        let dir = temp_dir("layerconf_test_factory_decorators");
        std::fs::write(dir.join("db.yaml"), "host: h\npassword: secret\n").unwrap();

        let factory = ReaderFactory::new().with_base_path(&dir);
        let options = ReaderOptions::default()
            .with_path("database")
            .with_exclude(vec!["database.password".into()]);
        let reader = factory.create_reader("db.yaml", &options).unwrap();

        assert!(reader.has_config().unwrap());
        assert_eq!(reader.read_config().unwrap(), yaml("database:\n  host: h\n"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
