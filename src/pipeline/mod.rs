//! Load runner
//!
//! Drains a page stream, normalizes the records into one table and replaces
//! the destination table with them.
//!
//! # Flow
//!
//! ```text
//! pages ──► normalize ──► infer schema ──► staging table ──► swap ──► target
//!                                              │
//!                                   failure: drop staging
//! ```
//!
//! All pages are fetched before the destination is touched, so a source
//! failure never reaches the warehouse. Rows are written into
//! `<table>__staging_<load_id>` and swapped over the target in one step; the
//! target is either fully replaced or left as it was.

mod types;

pub use types::{
    load_id, staging_table_name, LoadConfig, PipelineSettings, ResourceSettings, RunStatus,
    RunSummary, DEFAULT_BATCH_SIZE,
};

use crate::destination::{Destination, TableRef};
use crate::error::{Error, Result};
use crate::fetch::{Page, PageStream};
use crate::normalize::{normalize_identifier, normalize_records, Row};
use crate::schema::{infer_schema, TableSchema};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// A configured pipeline bound to one destination
pub struct Pipeline {
    settings: PipelineSettings,
    destination: Box<dyn Destination>,
}

impl Pipeline {
    /// Create a pipeline writing into `destination`
    pub fn new(settings: PipelineSettings, destination: Box<dyn Destination>) -> Self {
        Self {
            settings,
            destination,
        }
    }

    /// Pipeline settings
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The destination this pipeline writes into
    pub fn destination(&self) -> &dyn Destination {
        self.destination.as_ref()
    }

    /// Fetch every page from `pages` and replace the resource's table
    pub async fn run(&self, pages: PageStream, resource: &ResourceSettings) -> Result<RunSummary> {
        self.run_started_at(pages, resource, Utc::now()).await
    }

    /// Like [`Pipeline::run`], for a run whose start time the caller fixed.
    /// The dev-mode dataset suffix and load id derive from `started_at`.
    pub async fn run_started_at(
        &self,
        mut pages: PageStream,
        resource: &ResourceSettings,
        started_at: DateTime<Utc>,
    ) -> Result<RunSummary> {
        info!(
            "Starting pipeline {} ({} -> {})",
            self.settings.pipeline_name,
            resource.name,
            self.destination.kind()
        );

        let mut fetched = Vec::new();
        while let Some(page) = pages.next_page().await? {
            debug!("Page {}: {} records", page.number, page.len());
            fetched.push(page);
        }

        self.load_pages(fetched, resource, started_at).await
    }

    /// Replace the resource's table with the records of `pages`
    pub async fn load_pages(
        &self,
        pages: Vec<Page>,
        resource: &ResourceSettings,
        started_at: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let pages_fetched = pages.len() as u32;
        let records: Vec<_> = pages.into_iter().flat_map(|p| p.records).collect();
        let rows = normalize_records(&records)?;
        let schema = infer_schema(&rows);

        let load_id = load_id(started_at);
        let dataset = normalize_identifier(&self.settings.dataset_for_run(started_at));
        let target = TableRef::new(dataset, normalize_identifier(&resource.name));

        debug!(
            "Loading {} rows with {} columns into {} (load {})",
            rows.len(),
            schema.len(),
            target,
            load_id
        );

        self.replace_table(&target, &schema, &rows, &load_id)
            .await
            .inspect_err(|e| error!("Load into {} failed: {}", target, e))?;

        let summary = RunSummary {
            pipeline_name: self.settings.pipeline_name.clone(),
            destination: self.destination.kind(),
            dataset: target.dataset.clone(),
            table: target.table.clone(),
            write_disposition: resource.write_disposition,
            load_id,
            started_at,
            finished_at: Utc::now(),
            pages_fetched,
            total_rows: rows.len(),
            columns: schema.columns,
            status: RunStatus::Success,
            error_kind: None,
            error: None,
        };

        info!(
            "Pipeline {} loaded {} rows into {} from {} pages",
            summary.pipeline_name, summary.total_rows, target, summary.pages_fetched
        );
        Ok(summary)
    }

    async fn replace_table(
        &self,
        target: &TableRef,
        schema: &TableSchema,
        rows: &[Row],
        load_id: &str,
    ) -> Result<()> {
        self.destination
            .ensure_dataset(&target.dataset)
            .await
            .map_err(|e| self.as_load_error(e))?;

        if rows.is_empty() {
            info!("No rows fetched, dropping {}", target);
            return self
                .destination
                .drop_table(target)
                .await
                .map_err(|e| self.as_load_error(e));
        }

        if schema.is_empty() {
            return Err(Error::load(
                self.destination.kind().to_string(),
                "fetched records have no fields",
            ));
        }

        let staging = target.sibling(staging_table_name(&target.table, load_id));
        self.destination
            .create_or_replace_table(&staging, schema)
            .await
            .map_err(|e| self.as_load_error(e))?;

        if let Err(e) = self.fill_and_swap(&staging, target, schema, rows).await {
            if let Err(cleanup) = self.destination.drop_table(&staging).await {
                warn!("Failed to drop staging table {}: {}", staging, cleanup);
            }
            return Err(self.as_load_error(e));
        }

        Ok(())
    }

    async fn fill_and_swap(
        &self,
        staging: &TableRef,
        target: &TableRef,
        schema: &TableSchema,
        rows: &[Row],
    ) -> Result<()> {
        let batch_size = self.settings.load.batch_size.max(1);
        let mut written = 0;

        for chunk in rows.chunks(batch_size) {
            written += self.destination.insert_rows(staging, schema, chunk).await?;
            debug!("Staged {}/{} rows into {}", written, rows.len(), staging);
        }

        self.destination.replace_from_staging(staging, target).await
    }

    /// Destination failures surface as load errors
    fn as_load_error(&self, e: Error) -> Error {
        if types::is_load_error(&e) {
            e
        } else {
            Error::load(self.destination.kind().to_string(), e.to_string())
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("settings", &self.settings)
            .field("destination", &self.destination.kind())
            .finish()
    }
}
