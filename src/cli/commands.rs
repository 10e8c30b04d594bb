//! CLI commands and argument parsing

use crate::types::DestinationKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Load a paginated REST API into BigQuery or DuckDB
#[derive(Parser, Debug)]
#[command(name = "restload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Built-in pipeline name or pipeline definition file (YAML)
    #[arg(short, long, global = true)]
    pub pipeline: Option<String>,

    /// Override the pipeline's destination
    #[arg(short, long, global = true)]
    pub destination: Option<DestinationKind>,

    /// DuckDB database file (defaults to `<pipeline name>.duckdb`)
    #[arg(long, global = true)]
    pub duckdb_path: Option<PathBuf>,

    /// Override the dataset name
    #[arg(long, global = true)]
    pub dataset: Option<String>,

    /// Suffix the dataset with the run timestamp
    #[arg(long, global = true)]
    pub dev_mode: Option<bool>,

    /// Stop after this many pages
    #[arg(long, global = true)]
    pub max_pages: Option<u32>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Subcommand to execute; a bare invocation runs the pipeline
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Fetch every page and replace the destination table
    Run,

    /// Validate the pipeline definition and credentials without any network calls
    Validate,

    /// List built-in pipelines
    List,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Text,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_runs_default() {
        let cli = Cli::try_parse_from(["restload"]).unwrap();

        assert_eq!(cli.command(), Commands::Run);
        assert_eq!(cli.pipeline, None);
        assert_eq!(cli.destination, None);
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_overrides_parse() {
        let cli = Cli::try_parse_from([
            "restload",
            "--pipeline",
            "ny_taxi",
            "--destination",
            "duckdb",
            "--duckdb-path",
            "taxi.duckdb",
            "--dataset",
            "rides",
            "--dev-mode",
            "false",
            "--max-pages",
            "3",
            "--format",
            "json",
            "-v",
            "run",
        ])
        .unwrap();

        assert_eq!(cli.pipeline.as_deref(), Some("ny_taxi"));
        assert_eq!(cli.destination, Some(DestinationKind::Duckdb));
        assert_eq!(cli.duckdb_path, Some(PathBuf::from("taxi.duckdb")));
        assert_eq!(cli.dataset.as_deref(), Some("rides"));
        assert_eq!(cli.dev_mode, Some(false));
        assert_eq!(cli.max_pages, Some(3));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["restload", "validate", "--destination", "bigquery"]).unwrap();
        assert_eq!(cli.command(), Commands::Validate);
        assert_eq!(cli.destination, Some(DestinationKind::Bigquery));
    }

    #[test]
    fn test_unknown_destination_rejected() {
        assert!(Cli::try_parse_from(["restload", "--destination", "snowflake"]).is_err());
    }
}
