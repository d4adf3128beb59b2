//! Configuration readers
//!
//! A [`ConfigReader`] produces one raw configuration tree. File readers parse
//! YAML or JSON, the environment reader maps prefixed variables onto paths,
//! and the remaining readers combine or reshape other readers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};
use crate::factory::{ReaderFactory, ReaderOptions};
use crate::loader::merge_readers;
use crate::path::{self, ConfigPath};
use crate::resolver::EnvSource;
use crate::value::Value;

/// Default separator between path segments in environment variable names
pub const DEFAULT_ENV_SEPARATOR: &str = "__";

/// A source of configuration
pub trait ConfigReader: Send + Sync {
    /// Whether the source currently has content to read
    fn has_config(&self) -> Result<bool>;

    /// Read the raw, unprocessed tree
    fn read_config(&self) -> Result<Value>;

    /// Short human readable description used in error messages
    fn describe(&self) -> String {
        "config reader".into()
    }
}

impl ConfigReader for Box<dyn ConfigReader> {
    fn has_config(&self) -> Result<bool> {
        self.as_ref().has_config()
    }

    fn read_config(&self) -> Result<Value> {
        self.as_ref().read_config()
    }

    fn describe(&self) -> String {
        self.as_ref().describe()
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        Error::io(
            path.display().to_string(),
            format!("Failed to read file: {}", e),
        )
    })
}

fn expect_mapping(value: Value, source: &Path) -> Result<Value> {
    if value.is_mapping() {
        Ok(value)
    } else {
        Err(Error::invalid_source_output(
            source.display().to_string(),
            value.type_name(),
        ))
    }
}

/// Reads a YAML file
#[derive(Debug, Clone)]
pub struct YamlFileReader {
    path: PathBuf,
}

impl YamlFileReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigReader for YamlFileReader {
    fn has_config(&self) -> Result<bool> {
        Ok(self.path.is_file())
    }

    fn read_config(&self) -> Result<Value> {
        let content = read_file(&self.path)?;
        let value: Value = serde_yaml::from_str(&content).map_err(|e| {
            Error::parse(format!("Error while parsing YAML: {}", e))
                .with_resource(self.path.display().to_string())
        })?;
        expect_mapping(value, &self.path)
    }

    fn describe(&self) -> String {
        format!("yaml file {}", self.path.display())
    }
}

/// Reads a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileReader {
    path: PathBuf,
}

impl JsonFileReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigReader for JsonFileReader {
    fn has_config(&self) -> Result<bool> {
        Ok(self.path.is_file())
    }

    fn read_config(&self) -> Result<Value> {
        let content = read_file(&self.path)?;
        let value: Value = serde_json::from_str(&content).map_err(|e| {
            Error::parse(format!("Error while parsing JSON: {}", e))
                .with_resource(self.path.display().to_string())
        })?;
        expect_mapping(value, &self.path)
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}

/// Maps environment variables onto config paths
///
/// With prefix `APP` and the default separator, `APP__db__host=x` becomes
/// `db.host: x`. An empty prefix reads every variable.
pub struct EnvironmentReader {
    prefix: String,
    separator: String,
    env: Arc<dyn EnvSource>,
}

impl EnvironmentReader {
    pub fn new(prefix: impl Into<String>, env: Arc<dyn EnvSource>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: DEFAULT_ENV_SEPARATOR.into(),
            env,
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

impl ConfigReader for EnvironmentReader {
    fn has_config(&self) -> Result<bool> {
        Ok(true)
    }

    fn read_config(&self) -> Result<Value> {
        let full_prefix = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}{}", self.prefix, self.separator)
        };

        let mut vars = self.env.vars();
        vars.sort();

        let mut config = Value::empty_mapping();
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(full_prefix.as_str()) else {
                continue;
            };
            let path = ConfigPath::from_segments(key.split(self.separator.as_str()));
            if path::set_parsed(&mut config, &path, Value::String(value)).is_err() {
                log::warn!("Ignoring environment variable {}: empty path segment", name);
            }
        }
        Ok(config)
    }

    fn describe(&self) -> String {
        format!("environment prefix '{}'", self.prefix)
    }
}

/// Reads every file matching a glob pattern, in sorted order
///
/// Each file is read as a root reader, so its own imports are honored.
pub struct GlobFileReader {
    pattern: String,
    factory: ReaderFactory,
}

impl GlobFileReader {
    pub fn new(pattern: impl Into<String>, factory: ReaderFactory) -> Self {
        Self {
            pattern: pattern.into(),
            factory,
        }
    }

    fn files(&self) -> Result<Vec<PathBuf>> {
        let entries = glob::glob(&self.pattern).map_err(|e| {
            Error::io(&self.pattern, format!("Invalid glob pattern: {}", e))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(file) => Some(file),
                Err(e) => {
                    log::warn!("Skipping unreadable match of {}: {}", self.pattern, e);
                    None
                }
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl ConfigReader for GlobFileReader {
    fn has_config(&self) -> Result<bool> {
        Ok(!self.files()?.is_empty())
    }

    fn read_config(&self) -> Result<Value> {
        let readers = self
            .files()?
            .iter()
            .map(|file| {
                self.factory
                    .session_root_reader(&file.display().to_string(), &ReaderOptions::default())
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("Glob {} matched {} file(s)", self.pattern, readers.len());
        merge_readers(&readers)
    }

    fn describe(&self) -> String {
        format!("glob {}", self.pattern)
    }
}

type ReadFn = Box<dyn Fn() -> Result<Value> + Send + Sync>;
type HasFn = Box<dyn Fn() -> Result<bool> + Send + Sync>;

/// Reader backed by closures
pub struct ClosureConfigReader {
    read: ReadFn,
    has: Option<HasFn>,
}

impl ClosureConfigReader {
    /// Without a `has_config` closure, content exists when `read` returns a non-empty tree
    pub fn new<F>(read: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            read: Box::new(read),
            has: None,
        }
    }

    pub fn with_has_config<F>(mut self, has: F) -> Self
    where
        F: Fn() -> Result<bool> + Send + Sync + 'static,
    {
        self.has = Some(Box::new(has));
        self
    }
}

impl ConfigReader for ClosureConfigReader {
    fn has_config(&self) -> Result<bool> {
        match &self.has {
            Some(has) => has(),
            None => Ok(match self.read_config()? {
                Value::Mapping(map) => !map.is_empty(),
                Value::Sequence(seq) => !seq.is_empty(),
                Value::Null => false,
                _ => true,
            }),
        }
    }

    fn read_config(&self) -> Result<Value> {
        (self.read)()
    }

    fn describe(&self) -> String {
        "closure".into()
    }
}

/// Merges several readers in order
pub struct CollectionReader {
    readers: Vec<Box<dyn ConfigReader>>,
}

impl CollectionReader {
    pub fn new(readers: Vec<Box<dyn ConfigReader>>) -> Self {
        Self { readers }
    }
}

impl ConfigReader for CollectionReader {
    fn has_config(&self) -> Result<bool> {
        Ok(!self.readers.is_empty())
    }

    fn read_config(&self) -> Result<Value> {
        merge_readers(&self.readers)
    }

    fn describe(&self) -> String {
        format!("collection of {} reader(s)", self.readers.len())
    }
}

/// Places the content of another reader under a path
pub struct NestedConfigReader {
    reader: Box<dyn ConfigReader>,
    path: String,
}

impl NestedConfigReader {
    pub fn new(reader: Box<dyn ConfigReader>, path: impl Into<String>) -> Self {
        Self {
            reader,
            path: path.into(),
        }
    }
}

impl ConfigReader for NestedConfigReader {
    fn has_config(&self) -> Result<bool> {
        self.reader.has_config()
    }

    fn read_config(&self) -> Result<Value> {
        path::set(&Value::empty_mapping(), &self.path, self.reader.read_config()?)
    }

    fn describe(&self) -> String {
        format!("{} under '{}'", self.reader.describe(), self.path)
    }
}

/// Removes paths from the content of another reader
///
/// Paths that do not exist are ignored.
pub struct ExcludedConfigReader {
    reader: Box<dyn ConfigReader>,
    paths: Vec<String>,
}

impl ExcludedConfigReader {
    pub fn new(reader: Box<dyn ConfigReader>, paths: Vec<String>) -> Self {
        Self { reader, paths }
    }
}

impl ConfigReader for ExcludedConfigReader {
    fn has_config(&self) -> Result<bool> {
        self.reader.has_config()
    }

    fn read_config(&self) -> Result<Value> {
        let mut config = self.reader.read_config()?;
        for excluded in &self.paths {
            match path::remove(&config, excluded) {
                Ok(removed) => config = removed,
                Err(e) if e.kind == ErrorKind::PathNotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(config)
    }

    fn describe(&self) -> String {
        self.reader.describe()
    }
}
