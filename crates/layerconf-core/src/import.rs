//! Import resolution
//!
//! A root reader reads one resource and then everything listed under its
//! `imports` key:
//!
//! ```yaml
//! imports:
//!   - resource: base.yaml
//!   - resource: local.yaml
//!     optional: true
//!   - resource: APP
//!     type: env
//!     path: app
//! ```
//!
//! Imports are merged in order, then the importing resource's own content is
//! merged on top. Relative resources resolve against the importing file's
//! directory. Cycles are detected through an import stack shared by every
//! root reader of one session.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::factory::{ReaderFactory, ReaderOptions};
use crate::reader::ConfigReader;
use crate::value::Value;

/// Key holding the import directive
pub const IMPORTS_KEY: &str = "imports";

/// Resources whose imports are currently being resolved
#[derive(Debug, Clone, Default)]
pub(crate) struct ImportStack {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ImportStack {
    /// Register `resource`, failing if it is already being imported
    pub(crate) fn enter(&self, resource: &str) -> Result<ImportGuard> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.iter().any(|r| r == resource) {
            let mut chain = entries.clone();
            chain.push(resource.to_string());
            return Err(Error::recursion_detected(chain).with_resource(resource));
        }
        entries.push(resource.to_string());

        Ok(ImportGuard {
            stack: self.clone(),
            resource: resource.to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Unregisters its resource when dropped
pub(crate) struct ImportGuard {
    stack: ImportStack,
    resource: String,
}

impl Drop for ImportGuard {
    fn drop(&mut self) {
        let mut entries = self.stack.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = entries.iter().rposition(|r| *r == self.resource) {
            entries.remove(pos);
        }
    }
}

/// One entry of an `imports` list
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDescriptor {
    pub resource: String,
    pub options: ReaderOptions,
    pub optional: bool,
}

impl ImportDescriptor {
    /// Parse a descriptor; `importer` is only used for error context
    pub fn from_value(value: &Value, importer: &str) -> Result<Self> {
        let Value::Mapping(map) = value else {
            return Err(Error::invalid_import(
                importer,
                format!("each import must be a mapping, got {}", value.type_name()),
            ));
        };

        let resource = match map.get("resource") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(other) => {
                return Err(Error::invalid_import(
                    importer,
                    format!("'resource' must be a non-empty string, got {}", other.type_name()),
                ))
            }
            None => return Err(Error::invalid_import(importer, "'resource' is required")),
        };

        let mut descriptor = Self {
            resource,
            options: ReaderOptions::default(),
            optional: false,
        };

        for (key, entry) in map {
            match key.as_str() {
                "resource" => {}
                "type" => descriptor.options.reader_type = Some(string_option(entry, key, importer)?),
                "path" => descriptor.options.path = Some(string_option(entry, key, importer)?),
                "exclude" => descriptor.options.exclude = exclude_option(entry, importer)?,
                "optional" => descriptor.optional |= bool_option(entry, key, importer)?,
                "ignore_errors" => {
                    log::warn!(
                        "'ignore_errors' in imports of {} is deprecated, use 'optional'",
                        importer
                    );
                    descriptor.optional |= bool_option(entry, key, importer)?;
                }
                _ => {
                    descriptor.options.extra.insert(key.clone(), entry.clone());
                }
            }
        }

        Ok(descriptor)
    }
}

fn string_option(value: &Value, key: &str, importer: &str) -> Result<String> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        Error::invalid_import(
            importer,
            format!("'{}' must be a string, got {}", key, value.type_name()),
        )
    })
}

fn bool_option(value: &Value, key: &str, importer: &str) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        Error::invalid_import(
            importer,
            format!("'{}' must be a boolean, got {}", key, value.type_name()),
        )
    })
}

fn exclude_option(value: &Value, importer: &str) -> Result<Vec<String>> {
    let invalid = || Error::invalid_import(importer, "'exclude' must be a list of paths");
    value
        .as_sequence()
        .ok_or_else(invalid)?
        .iter()
        .map(|p| p.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

/// Reads a resource and resolves its `imports`
pub struct RootConfigReader {
    resource: String,
    reader: Box<dyn ConfigReader>,
    factory: ReaderFactory,
}

impl RootConfigReader {
    /// `factory` builds the imported readers; its base path is the resource's directory
    pub fn new(resource: impl Into<String>, reader: Box<dyn ConfigReader>, factory: ReaderFactory) -> Self {
        Self {
            resource: resource.into(),
            reader,
            factory,
        }
    }

    fn process_imports(&self, mut config: Value) -> Result<Value> {
        let imports = match config.as_mapping_mut() {
            Some(map) => map.shift_remove(IMPORTS_KEY),
            None => None,
        };

        let descriptors = match imports {
            None | Some(Value::Null) => return Ok(config),
            Some(Value::Sequence(seq)) => seq,
            Some(other) => {
                return Err(Error::invalid_import(
                    &self.resource,
                    format!("'{}' must be a list, got {}", IMPORTS_KEY, other.type_name()),
                ))
            }
        };

        let _guard = self.factory.import_stack().enter(&self.resource)?;
        log::debug!(
            "Resolving {} import(s) of {}",
            descriptors.len(),
            self.resource
        );

        let mut imported = Value::empty_mapping();
        for entry in &descriptors {
            let descriptor = ImportDescriptor::from_value(entry, &self.resource)?;
            let reader = self
                .factory
                .session_root_reader(&descriptor.resource, &descriptor.options)
                .map_err(|e| e.with_resource(&self.resource))?;

            if !reader.has_config()? {
                if descriptor.optional {
                    log::debug!(
                        "Skipping optional import {} of {}",
                        descriptor.resource,
                        self.resource
                    );
                    continue;
                }
                return Err(Error::mandatory_import_missing(
                    &descriptor.resource,
                    &self.resource,
                ));
            }

            imported.merge(reader.read_config()?);
        }

        Ok(imported.merged(config))
    }
}

impl ConfigReader for RootConfigReader {
    fn has_config(&self) -> Result<bool> {
        self.reader.has_config()
    }

    fn read_config(&self) -> Result<Value> {
        let config = self.reader.read_config()?;
        self.process_imports(config)
    }

    fn describe(&self) -> String {
        self.reader.describe()
    }
}
