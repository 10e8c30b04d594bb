//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{BigQueryConfig, DestinationConfig, GcpCredentials};
use crate::destination;
use crate::error::{Error, Result, ResultExt};
use crate::fetch::PageFetcher;
use crate::loader::{load_pipeline, load_pipeline_from_str, validate_pipeline, PipelineDefinition};
use crate::normalize::normalize_identifier;
use crate::pipeline::{Pipeline, RunSummary};
use crate::pipelines::{get_builtin, list_builtin, DEFAULT_PIPELINE};
use crate::types::DestinationKind;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// CLI runner
pub struct Runner {
    cli: Cli,
    env: EnvLookup,
}

impl Runner {
    /// Create a runner reading credentials from the process environment
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Resolve credentials through `lookup` instead of the environment
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match self.cli.command() {
            Commands::Run => self.run_and_report().await,
            Commands::Validate => self.validate(),
            Commands::List => self.list_pipelines(),
        }
    }

    /// Load the pipeline definition and apply command line overrides
    pub fn load_definition(&self) -> Result<PipelineDefinition> {
        let name = self.cli.pipeline.as_deref().unwrap_or(DEFAULT_PIPELINE);
        let mut def = load_pipeline(name)?;

        if let Some(destination) = self.cli.destination {
            def.destination = destination;
        }
        if let Some(dataset) = &self.cli.dataset {
            def.dataset.clone_from(dataset);
        }
        if let Some(dev_mode) = self.cli.dev_mode {
            def.dev_mode = dev_mode;
        }

        validate_pipeline(&def)?;
        Ok(def)
    }

    /// Resolve the destination; BigQuery credentials are read here, before any I/O
    pub fn destination_config(&self, def: &PipelineDefinition) -> Result<DestinationConfig> {
        match def.destination {
            DestinationKind::Bigquery => {
                let credentials = GcpCredentials::from_lookup(|key| (self.env)(key))?;
                Ok(DestinationConfig::BigQuery(
                    BigQueryConfig::new(credentials).with_file_format(def.load.file_format),
                ))
            }
            DestinationKind::Duckdb => {
                let path = self
                    .cli
                    .duckdb_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(format!("{}.duckdb", def.name)));
                Ok(DestinationConfig::duckdb(path))
            }
        }
    }

    /// Execute the pipeline and return its summary
    pub async fn run_pipeline(&self) -> Result<RunSummary> {
        let def = self.load_definition()?;
        let config = self.destination_config(&def)?;
        self.execute(&def, &config, Utc::now()).await
    }

    async fn execute(
        &self,
        def: &PipelineDefinition,
        config: &DestinationConfig,
        started_at: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let mut fetcher_config = def.fetcher_config();
        if let Some(max_pages) = self.cli.max_pages {
            fetcher_config = fetcher_config.with_max_pages(max_pages);
        }

        let destination = destination::connect(config)?;
        let pages = PageFetcher::new(fetcher_config)?.fetch_all();

        debug!("Running pipeline {} into {}", def.name, def.destination);
        Pipeline::new(def.settings(), destination)
            .run_started_at(pages, &def.resource_settings(), started_at)
            .await
    }

    /// Summary of a run that failed; names the dataset the run was writing
    fn failure_summary(
        &self,
        def: &PipelineDefinition,
        started_at: DateTime<Utc>,
        error: &Error,
    ) -> RunSummary {
        RunSummary::failed(
            &def.name,
            def.destination,
            normalize_identifier(&def.settings().dataset_for_run(started_at)),
            normalize_identifier(&def.resource.name),
            started_at,
            error,
        )
    }

    async fn run_and_report(&self) -> Result<()> {
        let def = self.load_definition()?;
        let config = self.destination_config(&def)?;
        let started_at = Utc::now();

        match self.execute(&def, &config, started_at).await {
            Ok(summary) => {
                self.output_summary(&summary)?;
                Ok(())
            }
            Err(e) => {
                if self.cli.format == OutputFormat::Json {
                    self.output_summary(&self.failure_summary(&def, started_at, &e))?;
                }
                Err(e)
            }
        }
    }

    /// Validate the definition and, for BigQuery, the credentials
    fn validate(&self) -> Result<()> {
        let def = self.load_definition()?;
        self.destination_config(&def)?;

        let url = format!(
            "{}/{}",
            def.source.base_url.trim_end_matches('/'),
            def.source.path.trim_start_matches('/')
        );
        match self.cli.format {
            OutputFormat::Json => self.output_json(&json!({
                "valid": true,
                "pipeline": def.name,
                "source": url,
                "destination": def.destination,
                "dataset": def.dataset,
                "table": normalize_identifier(&def.resource.name),
            }))?,
            OutputFormat::Text => println!(
                "Pipeline '{}' is valid: {} -> {} dataset {} table {}",
                def.name,
                url,
                def.destination,
                def.dataset,
                normalize_identifier(&def.resource.name)
            ),
        }
        Ok(())
    }

    /// List built-in pipelines
    fn list_pipelines(&self) -> Result<()> {
        let mut pipelines = Vec::new();
        for name in list_builtin() {
            let yaml = get_builtin(name)
                .ok_or_else(|| Error::config(format!("built-in pipeline '{name}' missing")))?;
            let def = load_pipeline_from_str(yaml)?;
            pipelines.push((name, def));
        }

        match self.cli.format {
            OutputFormat::Json => {
                let list: Vec<Value> = pipelines
                    .iter()
                    .map(|(name, def)| {
                        json!({
                            "name": name,
                            "pipeline": def.name,
                            "dataset": def.dataset,
                            "destination": def.destination,
                            "base_url": def.source.base_url,
                            "path": def.source.path,
                            "resource": def.resource.name,
                        })
                    })
                    .collect();
                self.output_json(&Value::Array(list))?;
            }
            OutputFormat::Text => {
                for (name, def) in &pipelines {
                    println!(
                        "{name}\t{} -> {}.{} ({})",
                        def.source.base_url, def.dataset, def.resource.name, def.destination
                    );
                }
            }
        }
        Ok(())
    }

    fn output_summary(&self, summary: &RunSummary) -> Result<()> {
        match self.cli.format {
            OutputFormat::Json => {
                let value = serde_json::to_value(summary).context("serializing run summary")?;
                self.output_json(&value)
            }
            OutputFormat::Text => {
                println!("{summary}");
                Ok(())
            }
        }
    }

    fn output_json(&self, value: &Value) -> Result<()> {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("formatting JSON output")?
        );
        Ok(())
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner").field("cli", &self.cli).finish()
    }
}
