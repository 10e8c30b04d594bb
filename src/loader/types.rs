//! Loader types
//!
//! Declarative pipeline definition types for YAML parsing.

use crate::fetch::FetcherConfig;
use crate::pagination::PageNumberPaginator;
use crate::pipeline::{LoadConfig, PipelineSettings, ResourceSettings, DEFAULT_BATCH_SIZE};
use crate::types::{DestinationKind, LoaderFileFormat, WriteDisposition};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Pipeline Definition
// ============================================================================

/// Top-level pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PipelineDefinition {
    /// Pipeline name
    pub name: String,
    /// Dataset (BigQuery) or schema (DuckDB)
    pub dataset: String,
    /// Suffix the dataset with the run timestamp
    #[serde(default)]
    pub dev_mode: bool,
    /// Destination warehouse
    #[serde(default)]
    pub destination: DestinationKind,
    /// Source API
    pub source: SourceDefinition,
    /// Target resource
    pub resource: ResourceDefinition,
    /// Load settings
    #[serde(default)]
    pub load: LoadDefinition,
}

impl PipelineDefinition {
    /// Runner settings for this pipeline
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings::new(&self.name, &self.dataset)
            .with_dev_mode(self.dev_mode)
            .with_load(LoadConfig::new().with_batch_size(self.load.batch_size))
    }

    /// Resource settings for this pipeline
    pub fn resource_settings(&self) -> ResourceSettings {
        ResourceSettings {
            name: self.resource.name.clone(),
            write_disposition: self.resource.write_disposition,
        }
    }

    /// Fetcher configuration for this pipeline's source
    pub fn fetcher_config(&self) -> FetcherConfig {
        self.source.fetcher_config()
    }
}

// ============================================================================
// Source Definition
// ============================================================================

/// Paginated REST source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct SourceDefinition {
    /// Absolute http(s) base URL
    pub base_url: String,
    /// Resource path under `base_url`
    pub path: String,
    /// Optional path to the record list inside each response
    #[serde(default)]
    pub records_path: Option<String>,
    /// Pagination
    #[serde(default)]
    pub paginator: PaginatorDefinition,
    /// HTTP settings
    #[serde(default)]
    pub http: HttpDefinition,
}

impl SourceDefinition {
    /// Build the fetcher configuration
    pub fn fetcher_config(&self) -> FetcherConfig {
        let mut config = FetcherConfig::new(&self.base_url, &self.path)
            .with_paginator(self.paginator.build())
            .with_timeout(Duration::from_secs(self.http.timeout_secs))
            .with_max_retries(self.http.max_retries);

        if let Some(path) = &self.records_path {
            config = config.with_records_path(path);
        }
        if let Some(rps) = self.http.rate_limit_rps {
            config = config.with_rate_limit(rps);
        }
        config
    }
}

/// Pagination definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginatorDefinition {
    /// `?page=N` cursor incremented by one per page
    PageNumber {
        /// Query parameter carrying the page number
        #[serde(default = "default_page_param")]
        page_param: String,
        /// First page number
        #[serde(default = "default_base_page")]
        base_page: u32,
        /// JSON path of the total page count in each response
        #[serde(default)]
        total_path: Option<String>,
        /// Last page to request (inclusive)
        #[serde(default)]
        maximum_page: Option<u32>,
        /// A 404 after the first page ends the data
        #[serde(default = "default_true")]
        stop_on_not_found: bool,
    },
}

impl Default for PaginatorDefinition {
    fn default() -> Self {
        PaginatorDefinition::PageNumber {
            page_param: default_page_param(),
            base_page: default_base_page(),
            total_path: None,
            maximum_page: None,
            stop_on_not_found: true,
        }
    }
}

impl PaginatorDefinition {
    /// Build the paginator
    pub fn build(&self) -> PageNumberPaginator {
        match self {
            PaginatorDefinition::PageNumber {
                page_param,
                base_page,
                total_path,
                maximum_page,
                stop_on_not_found,
            } => {
                let mut paginator = PageNumberPaginator::new(page_param, *base_page)
                    .with_stop_on_not_found(*stop_on_not_found);
                if let Some(path) = total_path {
                    paginator = paginator.with_total_path(path);
                }
                if let Some(max) = maximum_page {
                    paginator = paginator.with_maximum_page(*max);
                }
                paginator
            }
        }
    }
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_base_page() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// HTTP settings for the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct HttpDefinition {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries per request
    #[serde(default)]
    pub max_retries: u32,
    /// Requests per second limit
    #[serde(default)]
    pub rate_limit_rps: Option<u32>,
}

impl Default for HttpDefinition {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            rate_limit_rps: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Resource and Load Definitions
// ============================================================================

/// Resource (table) definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ResourceDefinition {
    /// Resource name; becomes the table name
    pub name: String,
    /// Write disposition
    #[serde(default)]
    pub write_disposition: WriteDisposition,
}

/// Load settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct LoadDefinition {
    /// Rows per destination insert
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Load file encoding for BigQuery uploads
    #[serde(default)]
    pub file_format: LoaderFileFormat,
}

impl Default for LoadDefinition {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            file_format: LoaderFileFormat::default(),
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
