//! layerconf CLI - load layered configuration from the command line
//!
//! Usage:
//!   layerconf dump base.yaml local.yaml --format json
//!   layerconf get config.yaml database.host
//!   layerconf export config.yaml

use clap::{Parser, Subcommand};
use colored::Colorize;
use layerconf_core::{
    path, ConfigExporter, ConfigLoader, ConfigProcessor, ConfigReader, ErrorKind, Loader,
    PlaceholderEngine, ReaderFactory, ReaderOptions, ResolverRegistry, Value,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// layerconf - Layered configuration with imports and placeholders
#[derive(Parser)]
#[command(name = "layerconf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log loader activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the merged configuration
    Dump {
        /// Configuration file(s), later files override earlier ones
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        sources: SourceArgs,

        /// Output format: yaml, json
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Keep placeholders unresolved
        #[arg(long)]
        no_placeholders: bool,
    },

    /// Get a specific value from the configuration
    Get {
        /// Configuration file(s)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Path to the value (e.g., database.host)
        path: String,

        #[command(flatten)]
        sources: SourceArgs,

        /// Default value if the path is not found
        #[arg(short, long)]
        default: Option<String>,
    },

    /// Print the configuration with environment placeholders kept dynamic
    Export {
        /// Configuration file(s)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Environment prefix to merge after the files (repeatable)
        #[arg(long = "env", value_name = "PREFIX")]
        env_prefixes: Vec<String>,
    },

    /// Quick syntax check without imports or placeholders
    Check {
        /// Configuration file(s) to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Default)]
struct SourceArgs {
    /// Environment prefix to merge after the files (repeatable)
    #[arg(long = "env", value_name = "PREFIX")]
    env_prefixes: Vec<String>,

    /// Leave unresolvable placeholders in place instead of failing
    #[arg(long)]
    non_strict: bool,
}

/// Run the CLI with the given arguments
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Dump {
            files,
            sources,
            format,
            no_placeholders,
        } => cmd_dump(files, &sources, &format, no_placeholders),

        Commands::Get {
            files,
            path,
            sources,
            default,
        } => cmd_get(files, &path, &sources, default),

        Commands::Export {
            files,
            env_prefixes,
        } => cmd_export(files, &env_prefixes),

        Commands::Check { files } => cmd_check(files),
    }
}

fn init_logging(verbose: bool) {
    let filter = log_filter(verbose, std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Valid RUST_LOG directives replace the level chosen by --verbose
fn log_filter(verbose: bool, directives: Option<String>) -> EnvFilter {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(level.into()))
}

/// Root readers for every file followed by one reader per env prefix
fn build_readers(
    files: &[PathBuf],
    env_prefixes: &[String],
) -> Result<Vec<Box<dyn ConfigReader>>, String> {
    if files.is_empty() {
        return Err("No configuration files specified".to_string());
    }

    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine working directory: {}", e))?;
    let factory = ReaderFactory::new().with_base_path(cwd);

    let mut readers = Vec::with_capacity(files.len() + env_prefixes.len());
    for file in files {
        let resource = file.display().to_string();
        let reader = factory
            .create_root_reader(&resource, &ReaderOptions::default())
            .map_err(|e| format!("Failed to open {}: {}", resource, e))?;
        // Files named on the command line are mandatory.
        match reader.has_config() {
            Ok(true) => {}
            Ok(false) => return Err(format!("Failed to open {}: file not found", resource)),
            Err(e) => return Err(format!("Failed to open {}: {}", resource, e)),
        }
        readers.push(reader);
    }
    for prefix in env_prefixes {
        let options = ReaderOptions::default().with_type("env");
        let reader = factory
            .create_reader(prefix, &options)
            .map_err(|e| format!("Failed to open env prefix {}: {}", prefix, e))?;
        readers.push(reader);
    }

    Ok(readers)
}

fn load_config(files: &[PathBuf], sources: &SourceArgs, resolve: bool) -> Result<Value, String> {
    let readers = build_readers(files, &sources.env_prefixes)?;

    let mut processors: Vec<Box<dyn ConfigProcessor>> = Vec::new();
    if resolve {
        processors.push(Box::new(PlaceholderEngine::new(
            ResolverRegistry::with_builtins(),
            !sources.non_strict,
        )));
    }

    ConfigLoader::new(readers, processors)
        .load()
        .map_err(|e| e.to_string())
}

fn render(value: &Value, format: &str) -> Result<String, String> {
    match format {
        "json" => serde_json::to_string_pretty(value)
            .map(|s| s + "\n")
            .map_err(|e| e.to_string()),
        "yaml" | "yml" => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        other => Err(format!("Unsupported format: {}. Use yaml or json.", other)),
    }
}

/// Scalars print bare, structures print as YAML
fn render_text(value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Ok("null\n".to_string()),
        Value::Mapping(_) | Value::Sequence(_) => render(value, "yaml"),
        scalar => Ok(format!("{}\n", scalar)),
    }
}

fn cmd_dump(files: Vec<PathBuf>, sources: &SourceArgs, format: &str, no_placeholders: bool) -> ExitCode {
    let config = match load_config(&files, sources, !no_placeholders) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return ExitCode::from(2);
        }
    };

    match render(&config, format) {
        Ok(content) => {
            print!("{}", content);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

fn cmd_get(
    files: Vec<PathBuf>,
    config_path: &str,
    sources: &SourceArgs,
    default: Option<String>,
) -> ExitCode {
    let config = match load_config(&files, sources, true) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return ExitCode::from(2);
        }
    };

    let value = match path::get(&config, config_path) {
        Ok(value) => value.clone(),
        Err(e) if e.kind == ErrorKind::PathNotFound => match default {
            Some(default_val) => Value::String(default_val),
            None => {
                eprintln!("{}: Path '{}' not found", "Error".red(), config_path);
                return ExitCode::from(1);
            }
        },
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return ExitCode::from(1);
        }
    };

    match render_text(&value) {
        Ok(content) => {
            print!("{}", content);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

fn cmd_export(files: Vec<PathBuf>, env_prefixes: &[String]) -> ExitCode {
    let sources = SourceArgs {
        env_prefixes: env_prefixes.to_vec(),
        non_strict: false,
    };
    let config = match load_config(&files, &sources, false) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return ExitCode::from(2);
        }
    };

    match ConfigExporter::default().export_yaml(&config) {
        Ok(content) => {
            print!("{}", content);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

fn check_file(file: &std::path::Path) -> Result<&'static str, String> {
    let content = std::fs::read_to_string(file).map_err(|e| e.to_string())?;
    let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("");

    let (parsed, kind): (Result<Value, String>, _) = if ext == "json" {
        (
            serde_json::from_str(&content).map_err(|e| format!("Invalid JSON: {}", e)),
            "JSON",
        )
    } else {
        (
            serde_yaml::from_str(&content).map_err(|e| format!("Invalid YAML: {}", e)),
            "YAML",
        )
    };

    match parsed? {
        Value::Mapping(_) => Ok(kind),
        other => Err(format!("expected a mapping at the top level, got {}", other.type_name())),
    }
}

fn cmd_check(files: Vec<PathBuf>) -> ExitCode {
    let mut all_valid = true;

    for file in files {
        match check_file(&file) {
            Ok(kind) => println!("{} {}: valid {}", "✓".green(), file.display(), kind),
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), file.display(), e);
                all_valid = false;
            }
        }
    }

    if all_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
