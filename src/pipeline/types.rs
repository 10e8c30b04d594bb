//! Pipeline types
//!
//! Settings for a load run and the summary it produces.

use crate::error::{Error, ErrorKind};
use crate::schema::Column;
use crate::types::{DestinationKind, WriteDisposition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Default number of rows per destination insert
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

// ============================================================================
// Settings
// ============================================================================

/// How rows are handed to the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// Rows per `insert_rows` call
    pub batch_size: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl LoadConfig {
    /// Create a load config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set batch size
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }
}

/// Pipeline-level settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Pipeline name
    pub pipeline_name: String,
    /// Dataset (BigQuery) or schema (DuckDB) holding the tables
    pub dataset: String,
    /// Suffix the dataset with the run timestamp
    pub dev_mode: bool,
    /// Load settings
    pub load: LoadConfig,
}

impl PipelineSettings {
    /// Create settings for `pipeline_name` loading into `dataset`
    pub fn new(pipeline_name: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            dataset: dataset.into(),
            dev_mode: false,
            load: LoadConfig::default(),
        }
    }

    /// Enable/disable dev mode
    #[must_use]
    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// Set load config
    #[must_use]
    pub fn with_load(mut self, load: LoadConfig) -> Self {
        self.load = load;
        self
    }

    /// Dataset name for a run started at `started_at`
    pub fn dataset_for_run(&self, started_at: DateTime<Utc>) -> String {
        if self.dev_mode {
            format!("{}_{}", self.dataset, started_at.format("%Y%m%d%H%M%S"))
        } else {
            self.dataset.clone()
        }
    }
}

/// The resource (table) a run writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSettings {
    /// Resource name; becomes the table name
    pub name: String,
    /// Write disposition
    pub write_disposition: WriteDisposition,
}

impl ResourceSettings {
    /// Create a `replace` resource
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            write_disposition: WriteDisposition::Replace,
        }
    }
}

// ============================================================================
// Run Summary
// ============================================================================

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every row committed
    Success,
    /// Nothing committed
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Pipeline name
    pub pipeline_name: String,
    /// Destination the run wrote to
    pub destination: DestinationKind,
    /// Dataset actually used (dev-mode suffix included)
    pub dataset: String,
    /// Table name
    pub table: String,
    /// Write disposition
    pub write_disposition: WriteDisposition,
    /// Identifier of this run's load
    pub load_id: String,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
    /// Pages served by the source
    pub pages_fetched: u32,
    /// Rows committed to the table
    pub total_rows: usize,
    /// Final table columns
    pub columns: Vec<Column>,
    /// Terminal status
    pub status: RunStatus,
    /// Error class when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Error message when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    /// Summary of a run that failed with `error`
    pub fn failed(
        pipeline_name: impl Into<String>,
        destination: DestinationKind,
        dataset: impl Into<String>,
        table: impl Into<String>,
        started_at: DateTime<Utc>,
        error: &Error,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            destination,
            dataset: dataset.into(),
            table: table.into(),
            write_disposition: WriteDisposition::Replace,
            load_id: load_id(started_at),
            started_at,
            finished_at: Utc::now(),
            pages_fetched: 0,
            total_rows: 0,
            columns: Vec::new(),
            status: RunStatus::Failed,
            error_kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
        }
    }

    /// Whether the run committed
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Error class of a failed run
    pub fn failure_kind(&self) -> Option<&str> {
        self.error_kind.as_deref()
    }

    /// Wall-clock duration in seconds
    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.status == RunStatus::Failed {
            return write!(
                f,
                "Pipeline {} failed after {:.2}s: {}",
                self.pipeline_name,
                self.elapsed_secs(),
                self.error.as_deref().unwrap_or("unknown error")
            );
        }

        writeln!(
            f,
            "Pipeline {} load step completed in {:.2}s",
            self.pipeline_name,
            self.elapsed_secs()
        )?;
        writeln!(
            f,
            "Loaded to destination {} into dataset {}",
            self.destination, self.dataset
        )?;
        writeln!(
            f,
            "Table {} ({}): {} rows, {} columns from {} pages",
            self.table,
            self.write_disposition,
            self.total_rows,
            self.columns.len(),
            self.pages_fetched
        )?;
        write!(f, "Load {} is {}", self.load_id, self.status)
    }
}

/// Load id for a run started at `started_at`
pub fn load_id(started_at: DateTime<Utc>) -> String {
    started_at.format("%Y%m%d%H%M%S%6f").to_string()
}

/// Name of the staging table used by a load
pub fn staging_table_name(table: &str, load_id: &str) -> String {
    format!("{table}__staging_{load_id}")
}

/// Whether an error belongs to the load class
pub(crate) fn is_load_error(error: &Error) -> bool {
    error.kind() == ErrorKind::Load
}
