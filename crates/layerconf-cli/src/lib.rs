//! layerconf CLI library
//!
//! Exposes the command-line entry point so the binary stays a thin wrapper.

mod cli;

pub use cli::run;
