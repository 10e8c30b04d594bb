//! Common types used throughout restload
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Write Disposition
// ============================================================================

/// How a run's rows are written into the destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDisposition {
    /// Fully overwrite the table contents and schema on every run
    #[default]
    Replace,
}

impl std::fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteDisposition::Replace => write!(f, "replace"),
        }
    }
}

// ============================================================================
// Destination Kind
// ============================================================================

/// Which warehouse a pipeline loads into
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// Google BigQuery over its REST API
    #[default]
    Bigquery,
    /// Local DuckDB database file
    Duckdb,
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestinationKind::Bigquery => write!(f, "bigquery"),
            DestinationKind::Duckdb => write!(f, "duckdb"),
        }
    }
}

// ============================================================================
// Loader File Format
// ============================================================================

/// Encoding of the load files handed to a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderFileFormat {
    /// Newline-delimited JSON
    #[default]
    Jsonl,
    /// Apache Parquet
    Parquet,
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}
