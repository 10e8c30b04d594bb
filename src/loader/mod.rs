//! YAML Loader module
//!
//! Parse pipeline definitions from YAML files.
//!
//! # Overview
//!
//! The loader module provides:
//! - `PipelineDefinition` - Declarative pipeline description
//! - `SourceDefinition` - Paginated REST source configuration
//! - YAML parsing with validation

mod parser;
mod types;

pub use parser::{load_pipeline, load_pipeline_from_str, validate_pipeline};
pub use types::{
    HttpDefinition, LoadDefinition, PaginatorDefinition, PipelineDefinition, ResourceDefinition,
    SourceDefinition,
};
