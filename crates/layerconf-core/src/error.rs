//! Error types for layerconf
//!
//! Every failure carries a kind plus optional context: the config path being
//! processed, the resource being read, an underlying cause and a help line.

use std::fmt;

/// Result type alias for layerconf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for layerconf operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Path in the config where the error occurred (e.g., "database.port")
    pub path: Option<String>,
    /// Resource (file, glob pattern, env prefix) being read when the error occurred
    pub resource: Option<String>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty or malformed dotted path
    InvalidPath,
    /// Path lookup miss with no default supplied
    PathNotFound,
    /// Placeholder extraction or resolution failure
    Placeholder(PlaceholderErrorKind),
    /// Placeholder or import cycle
    RecursionDetected,
    /// Failure while processing an `imports` directive
    Import(ImportErrorKind),
    /// A reader returned something other than a mapping
    InvalidSourceOutput,
    /// Cast or string conversion failed
    TypeCoercion,
    /// Error parsing YAML/JSON
    Parse,
    /// I/O error (file not readable, cache not writable, etc.)
    Io,
    /// Internal error (bug in layerconf)
    Internal,
}

/// Specific placeholder error categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderErrorKind {
    /// Value contains no placeholder of the requested types
    Malformed { value: String },
    /// Strict mode: no resolver could produce a value
    Unresolvable { placeholder: String },
    /// A resolver for this type is already registered
    AlreadyRegistered { placeholder_type: String },
}

/// Specific import error categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportErrorKind {
    /// A non-optional import has no content
    MandatoryImportMissing { resource: String },
    /// The `imports` directive or one of its descriptors is malformed
    InvalidImport { message: String },
    /// No reader is registered for the resource type
    UnknownReaderType { reader_type: String },
}

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            resource: None,
            help: None,
            cause: None,
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            help: Some("Paths are dot separated; quote segments containing dots: \"a.b\".c".into()),
            cause: Some(message.into()),
            ..Self::from_kind(ErrorKind::InvalidPath)
        }
    }

    /// Create a path not found error
    pub fn path_not_found(path: impl Into<String>) -> Self {
        let path_str = path.into();
        Self {
            help: Some(format!(
                "Check that '{}' exists in the configuration",
                path_str
            )),
            path: Some(path_str),
            ..Self::from_kind(ErrorKind::PathNotFound)
        }
    }

    /// Create a malformed placeholder error
    pub fn malformed_placeholder(value: impl Into<String>) -> Self {
        Self {
            help: Some("Placeholders look like %type(accessor)% or %type(int:accessor)%".into()),
            ..Self::from_kind(ErrorKind::Placeholder(PlaceholderErrorKind::Malformed {
                value: value.into(),
            }))
        }
    }

    /// Create an unresolvable placeholder error (strict mode)
    pub fn placeholder_unresolvable(placeholder: impl Into<String>) -> Self {
        let p = placeholder.into();
        Self {
            help: Some(format!(
                "Make the target of {} available or disable strict mode",
                p
            )),
            ..Self::from_kind(ErrorKind::Placeholder(
                PlaceholderErrorKind::Unresolvable { placeholder: p },
            ))
        }
    }

    /// Create a resolver already registered error
    pub fn resolver_already_registered(placeholder_type: impl Into<String>) -> Self {
        let t = placeholder_type.into();
        Self {
            help: Some(format!(
                "Use register_with_force(..., true) to override the '{}' resolver",
                t
            )),
            ..Self::from_kind(ErrorKind::Placeholder(
                PlaceholderErrorKind::AlreadyRegistered {
                    placeholder_type: t,
                },
            ))
        }
    }

    /// Create a recursion error; `chain` lists the entries in the order they were entered
    pub fn recursion_detected(chain: Vec<String>) -> Self {
        Self {
            help: Some("Break the cycle by removing one of the references".into()),
            cause: Some(format!("Chain: {}", chain.join(" → "))),
            ..Self::from_kind(ErrorKind::RecursionDetected)
        }
    }

    /// Create a mandatory import missing error
    pub fn mandatory_import_missing(resource: impl Into<String>, importer: impl Into<String>) -> Self {
        let r = resource.into();
        Self {
            resource: Some(importer.into()),
            help: Some(format!(
                "Create '{}' or mark the import as optional: true",
                r
            )),
            ..Self::from_kind(ErrorKind::Import(ImportErrorKind::MandatoryImportMissing {
                resource: r,
            }))
        }
    }

    /// Create an invalid import directive error
    pub fn invalid_import(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: Some(resource.into()),
            help: Some("imports must be a list of mappings with at least a 'resource' key".into()),
            ..Self::from_kind(ErrorKind::Import(ImportErrorKind::InvalidImport {
                message: message.into(),
            }))
        }
    }

    /// Create an unknown reader type error
    pub fn unknown_reader_type(resource: impl Into<String>, reader_type: impl Into<String>) -> Self {
        let t = reader_type.into();
        Self {
            resource: Some(resource.into()),
            help: Some(format!(
                "Register a reader for '{}' or set an explicit type",
                t
            )),
            ..Self::from_kind(ErrorKind::Import(ImportErrorKind::UnknownReaderType {
                reader_type: t,
            }))
        }
    }

    /// Create an invalid source output error
    pub fn invalid_source_output(source: impl Into<String>, got: impl Into<String>) -> Self {
        Self {
            resource: Some(source.into()),
            cause: Some(format!("Expected a mapping, got {}", got.into())),
            ..Self::from_kind(ErrorKind::InvalidSourceOutput)
        }
    }

    /// Create a type coercion error
    pub fn type_coercion(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self {
            help: Some(format!(
                "Ensure the value can be converted to {}",
                expected.into()
            )),
            cause: Some(format!("Got: {}", got.into())),
            ..Self::from_kind(ErrorKind::TypeCoercion)
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::from_kind(ErrorKind::Parse)
        }
    }

    /// Create an I/O error
    pub fn io(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: Some(resource.into()),
            cause: Some(message.into()),
            ..Self::from_kind(ErrorKind::Io)
        }
    }

    /// Create an internal error (bug in layerconf)
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            help: Some("This is likely a bug in layerconf. Please report it.".into()),
            cause: Some(message.into()),
            ..Self::from_kind(ErrorKind::Internal)
        }
    }

    /// Add path context to the error, keeping an already recorded path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        if self.path.is_none() {
            self.path = Some(path.into());
        }
        self
    }

    /// Add resource context to the error, keeping an already recorded resource
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        if self.resource.is_none() {
            self.resource = Some(resource.into());
        }
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Whether this is a placeholder or import cycle
    pub fn is_recursion(&self) -> bool {
        self.kind == ErrorKind::RecursionDetected
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::InvalidPath => write!(f, "Invalid path")?,
            ErrorKind::PathNotFound => write!(f, "Path not found")?,
            ErrorKind::Placeholder(p) => match p {
                PlaceholderErrorKind::Malformed { value } => {
                    write!(f, "No placeholder found in value: {}", value)?
                }
                PlaceholderErrorKind::Unresolvable { placeholder } => {
                    write!(f, "Could not resolve placeholder: {}", placeholder)?
                }
                PlaceholderErrorKind::AlreadyRegistered { placeholder_type } => write!(
                    f,
                    "Resolver for placeholder type '{}' is already registered",
                    placeholder_type
                )?,
            },
            ErrorKind::RecursionDetected => write!(f, "Recursion detected")?,
            ErrorKind::Import(i) => match i {
                ImportErrorKind::MandatoryImportMissing { resource } => {
                    write!(f, "Could not import mandatory resource: {}", resource)?
                }
                ImportErrorKind::InvalidImport { message } => {
                    write!(f, "Invalid import: {}", message)?
                }
                ImportErrorKind::UnknownReaderType { reader_type } => {
                    write!(f, "Unknown reader type: {}", reader_type)?
                }
            },
            ErrorKind::InvalidSourceOutput => write!(f, "Invalid source output")?,
            ErrorKind::TypeCoercion => write!(f, "Type coercion failed")?,
            ErrorKind::Parse => write!(f, "Parse error")?,
            ErrorKind::Io => write!(f, "I/O error")?,
            ErrorKind::Internal => write!(f, "Internal error")?,
        }

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let Some(resource) = &self.resource {
            write!(f, "\n  Resource: {}", resource)?;
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
