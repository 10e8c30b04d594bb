//! CLI module
//!
//! Command-line interface for running pipelines.
//!
//! # Commands
//!
//! - `run` - Fetch every page and replace the destination table (default)
//! - `validate` - Check the pipeline definition and credentials
//! - `list` - List built-in pipelines

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
