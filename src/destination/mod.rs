//! Destination module
//!
//! A destination is a warehouse the load runner writes into. Every
//! implementation supports the same replace protocol: rows go into a staging
//! table first and are swapped over the target in a single step.
//!
//! # Supported destinations
//!
//! - **DuckDB**: local database file or in-memory database
//! - **BigQuery**: REST API with service-account authentication

mod bigquery;
mod duckdb;

pub use self::bigquery::BigQueryDestination;
pub use self::duckdb::DuckDbDestination;

use crate::config::DestinationConfig;
use crate::error::Result;
use crate::normalize::Row;
use crate::schema::TableSchema;
use crate::types::DestinationKind;
use async_trait::async_trait;
use std::sync::Arc;

/// Fully qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    /// Dataset (BigQuery) or schema (DuckDB)
    pub dataset: String,
    /// Table name
    pub table: String,
}

impl TableRef {
    /// Create a table reference
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Another table in the same dataset
    #[must_use]
    pub fn sibling(&self, table: impl Into<String>) -> Self {
        Self::new(self.dataset.clone(), table)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// A warehouse that can hold replaced tables
#[async_trait]
pub trait Destination: Send + Sync {
    /// Which warehouse this is
    fn kind(&self) -> DestinationKind;

    /// Create the dataset if it does not exist yet
    async fn ensure_dataset(&self, dataset: &str) -> Result<()>;

    /// Create `table` with `schema`, dropping any previous table of that name
    async fn create_or_replace_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()>;

    /// Append rows to an existing table, returning the number written
    async fn insert_rows(&self, table: &TableRef, schema: &TableSchema, rows: &[Row])
        -> Result<usize>;

    /// Make `target` hold exactly the contents of `staging`, then remove `staging`
    async fn replace_from_staging(&self, staging: &TableRef, target: &TableRef) -> Result<()>;

    /// Drop a table; a missing table is not an error
    async fn drop_table(&self, table: &TableRef) -> Result<()>;
}

#[async_trait]
impl<T: Destination + ?Sized> Destination for Arc<T> {
    fn kind(&self) -> DestinationKind {
        (**self).kind()
    }

    async fn ensure_dataset(&self, dataset: &str) -> Result<()> {
        (**self).ensure_dataset(dataset).await
    }

    async fn create_or_replace_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()> {
        (**self).create_or_replace_table(table, schema).await
    }

    async fn insert_rows(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        rows: &[Row],
    ) -> Result<usize> {
        (**self).insert_rows(table, schema, rows).await
    }

    async fn replace_from_staging(&self, staging: &TableRef, target: &TableRef) -> Result<()> {
        (**self).replace_from_staging(staging, target).await
    }

    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        (**self).drop_table(table).await
    }
}

/// Open the destination described by `config`
pub fn connect(config: &DestinationConfig) -> Result<Box<dyn Destination>> {
    match config {
        DestinationConfig::DuckDb { path: Some(path) } => {
            Ok(Box::new(DuckDbDestination::open(path)?))
        }
        DestinationConfig::DuckDb { path: None } => Ok(Box::new(DuckDbDestination::in_memory()?)),
        DestinationConfig::BigQuery(bq) => Ok(Box::new(BigQueryDestination::new(bq.clone())?)),
    }
}

#[cfg(test)]
mod tests;
