//! # restload
//!
//! Loads a paginated REST API resource into a warehouse table.
//!
//! A run walks `?page=1, 2, …` until the source signals the end, flattens
//! the JSON records into rows, infers one table schema over all of them and
//! replaces the destination table (BigQuery or DuckDB) in a single step.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use restload::config::DestinationConfig;
//! use restload::fetch::PageFetcher;
//! use restload::loader::load_pipeline;
//! use restload::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> restload::Result<()> {
//!     let def = load_pipeline("ny_taxi")?;
//!     let destination = restload::destination::connect(&DestinationConfig::duckdb("taxi.duckdb"))?;
//!
//!     let pages = PageFetcher::new(def.fetcher_config())?.fetch_all();
//!     let summary = Pipeline::new(def.settings(), destination)
//!         .run(pages, &def.resource_settings())
//!         .await?;
//!
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Pipeline                               │
//! │   run(pages, resource) → RunSummary                              │
//! └──────────────────────────────────────────────────────────────────┘
//!                                 │
//! ┌───────────┬───────────┬───────┴───────┬────────────┬─────────────┐
//! │   Fetch   │ Normalize │    Schema     │  Staging   │ Destination │
//! ├───────────┼───────────┼───────────────┼────────────┼─────────────┤
//! │ HTTP      │ Flatten   │ Union fields  │ JSONL      │ BigQuery    │
//! │ Paginate  │ Idents    │ Merge types   │ Parquet    │ DuckDB      │
//! │ Decode    │           │               │            │             │
//! └───────────┴───────────┴───────────────┴────────────┴─────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types and failure taxonomy
pub mod error;

/// Common types and type aliases
pub mod types;

/// Credentials and destination configuration
pub mod config;

/// Authentication for outbound HTTP calls
pub mod auth;

/// HTTP client with timeouts, retry and rate limiting
pub mod http;

/// Page number pagination
pub mod pagination;

/// Response decoders
pub mod decode;

/// Paginated fetcher
pub mod fetch;

/// Identifier normalization and record flattening
pub mod normalize;

/// Table schema inference
pub mod schema;

/// Load file encoding
pub mod staging;

/// Warehouse destinations
pub mod destination;

/// Load runner
pub mod pipeline;

/// YAML loader for pipeline definitions
pub mod loader;

/// Built-in pipeline definitions
pub mod pipelines;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, ErrorKind, Result};
pub use types::*;

pub use loader::{load_pipeline, load_pipeline_from_str, PipelineDefinition};
pub use pipeline::{Pipeline, RunSummary};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
