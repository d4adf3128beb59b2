//! layerconf-core: layered configuration with imports and placeholders
//!
//! Configuration is read from sources (YAML and JSON files, globbed files,
//! environment variables) that are deep-merged in order. A source may pull
//! in other sources through its `imports` key. Once merged, placeholders of
//! the form `%type(accessor)%` are resolved against the environment,
//! constants, globals or the configuration itself.
//!
//! # Example
//!
//! ```rust
//! use layerconf_core::{
//!     ClosureConfigReader, ConfigLoader, ConfigReader, ConfigProcessor, Loader,
//!     PlaceholderEngine, ResolverContext, StaticEnv, Value,
//! };
//!
//! let base: Value = serde_yaml::from_str("db:\n  host: localhost\n  port: 5432\n").unwrap();
//! let local: Value =
//!     serde_yaml::from_str("db:\n  host: '%env(DB_HOST)%'\nurl: 'pg://%conf(db.host)%:%conf(db.port)%'\n")
//!         .unwrap();
//!
//! let ctx = ResolverContext::new().with_env(StaticEnv::new().with_var("DB_HOST", "db1"));
//! let readers: Vec<Box<dyn ConfigReader>> = vec![
//!     Box::new(ClosureConfigReader::new(move || Ok(base.clone()))),
//!     Box::new(ClosureConfigReader::new(move || Ok(local.clone()))),
//! ];
//! let processors: Vec<Box<dyn ConfigProcessor>> =
//!     vec![Box::new(PlaceholderEngine::from_context(&ctx))];
//!
//! let config = ConfigLoader::new(readers, processors).load().unwrap();
//! assert_eq!(config.get_path("url").unwrap().as_str(), Some("pg://db1:5432"));
//! ```

pub mod error;
pub mod export;
pub mod factory;
pub mod import;
pub mod loader;
pub mod path;
pub mod placeholder;
pub mod processor;
pub mod reader;
pub mod resolver;
pub mod value;

pub use error::{Error, ErrorKind, ImportErrorKind, PlaceholderErrorKind, Result};
pub use export::ConfigExporter;
pub use factory::{ReaderFactory, ReaderFn, ReaderOptions};
pub use import::{ImportDescriptor, RootConfigReader, IMPORTS_KEY};
pub use loader::{merge_readers, CachedConfigLoader, ConfigLoader, Loader};
pub use path::ConfigPath;
pub use placeholder::{Cast, PlaceholderMatch, PlaceholderMatcher};
pub use processor::{ConfigProcessor, PlaceholderEngine};
pub use reader::{
    ClosureConfigReader, CollectionReader, ConfigReader, EnvironmentReader,
    ExcludedConfigReader, GlobFileReader, JsonFileReader, NestedConfigReader, YamlFileReader,
};
pub use resolver::{
    ConfResolver, ConstResolver, EnvResolver, EnvSource, FnResolver, GlobalResolver,
    PlaceholderResolver, ProcessEnv, ResolverContext, ResolverRegistry, StaticEnv,
};
pub use value::Value;
