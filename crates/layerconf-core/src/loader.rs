//! Loading pipelines
//!
//! [`ConfigLoader`] merges its readers in order and then runs its processors.
//! [`CachedConfigLoader`] keeps the result of another loader in a JSON file
//! named after a cache key.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::processor::ConfigProcessor;
use crate::reader::ConfigReader;
use crate::value::Value;

/// Prefix of cache file names in the cache directory
pub const CACHE_FILE_PREFIX: &str = "cached-config-";
const CACHE_FILE_EXTENSION: &str = "json";

/// Produces a final configuration tree
pub trait Loader {
    fn load(&self) -> Result<Value>;
}

/// Deep-merge the output of `readers` in order, skipping readers without content
pub fn merge_readers<R: ConfigReader>(readers: &[R]) -> Result<Value> {
    let mut merged = Value::empty_mapping();

    for (index, reader) in readers.iter().enumerate() {
        if !reader.has_config()? {
            log::debug!("Skipping reader #{} ({}): no content", index, reader.describe());
            continue;
        }

        let config = reader.read_config()?;
        if !config.is_mapping() {
            return Err(Error::invalid_source_output(
                format!("reader #{} ({})", index, reader.describe()),
                config.type_name(),
            ));
        }
        merged.merge(config);
    }

    Ok(merged)
}

/// Merges readers and applies processors
pub struct ConfigLoader {
    readers: Vec<Box<dyn ConfigReader>>,
    processors: Vec<Box<dyn ConfigProcessor>>,
}

impl ConfigLoader {
    pub fn new(
        readers: Vec<Box<dyn ConfigReader>>,
        processors: Vec<Box<dyn ConfigProcessor>>,
    ) -> Self {
        Self {
            readers,
            processors,
        }
    }
}

impl Loader for ConfigLoader {
    fn load(&self) -> Result<Value> {
        let merged = merge_readers(&self.readers)?;
        log::debug!("Merged {} reader(s)", self.readers.len());

        self.processors
            .iter()
            .try_fold(merged, |config, processor| processor.process_config(config))
    }
}

/// Caches the result of a loader on disk
///
/// The loader is only built on a cache miss. With an empty cache key the
/// result is never written.
pub struct CachedConfigLoader<F> {
    cache_dir: PathBuf,
    cache_key: String,
    builder: F,
}

impl<F, L> CachedConfigLoader<F>
where
    F: Fn() -> Result<L>,
    L: Loader,
{
    pub fn new(cache_dir: impl Into<PathBuf>, cache_key: impl Into<String>, builder: F) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            cache_key: cache_key.into(),
            builder,
        }
    }

    /// Location of the cache file for this key
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(format!(
            "{}{}.{}",
            CACHE_FILE_PREFIX, self.cache_key, CACHE_FILE_EXTENSION
        ))
    }

    pub fn has_cache(&self) -> bool {
        self.cache_file().is_file()
    }

    fn load_cache(&self, file: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(file).map_err(|e| {
            Error::io(file.display().to_string(), format!("Failed to read cache: {}", e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::parse(format!("Invalid cache file: {}", e))
                .with_resource(file.display().to_string())
        })
    }

    /// Remove cache files of every key
    fn clean_cache(&self) -> Result<()> {
        let pattern = format!(
            "{}{}{}*.{}",
            glob::Pattern::escape(&self.cache_dir.display().to_string()),
            std::path::MAIN_SEPARATOR,
            CACHE_FILE_PREFIX,
            CACHE_FILE_EXTENSION
        );

        let entries = glob::glob(&pattern)
            .map_err(|e| Error::io(&pattern, format!("Invalid cache pattern: {}", e)))?;
        for entry in entries {
            match entry {
                Ok(file) => {
                    if let Err(e) = std::fs::remove_file(&file) {
                        log::warn!("Could not remove stale cache {}: {}", file.display(), e);
                    }
                }
                Err(e) => log::warn!("Could not inspect stale cache entry: {}", e),
            }
        }
        Ok(())
    }

    fn store_cache(&self, file: &Path, config: &Value) -> Result<()> {
        let cache_dir = self.cache_dir.display().to_string();
        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| Error::io(&cache_dir, format!("Failed to create cache directory: {}", e)))?;

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| Error::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(file, content).map_err(|e| {
            Error::io(file.display().to_string(), format!("Failed to write cache: {}", e))
        })
    }
}

impl<F, L> Loader for CachedConfigLoader<F>
where
    F: Fn() -> Result<L>,
    L: Loader,
{
    fn load(&self) -> Result<Value> {
        let file = self.cache_file();
        if file.is_file() {
            log::debug!("Loading config from cache {}", file.display());
            return self.load_cache(&file);
        }

        let config = (self.builder)()?.load()?;

        if !self.cache_key.is_empty() {
            self.clean_cache()?;
            self.store_cache(&file, &config)?;
            log::info!("Wrote config cache {}", file.display());
        }

        Ok(config)
    }
}
