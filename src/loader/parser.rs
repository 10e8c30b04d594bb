//! YAML parser for pipeline definitions
//!
//! Parses and validates pipeline YAML files.
//! Supports both built-in pipelines (by name) and custom YAML files (by path).

use crate::error::{Error, Result};
use crate::loader::types::{PaginatorDefinition, PipelineDefinition};
use crate::pipelines;
use std::fs;
use std::path::Path;

/// Load a pipeline definition from a name or file path
///
/// A bare name without path separators or a YAML extension is looked up
/// among the built-in pipelines first.
///
/// # Examples
///
/// ```ignore
/// // Built-in pipeline
/// let pipeline = load_pipeline("ny_taxi")?;
///
/// // Custom pipeline
/// let pipeline = load_pipeline("./pipelines/github.yaml")?;
/// ```
pub fn load_pipeline(path: impl AsRef<Path>) -> Result<PipelineDefinition> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    if !path_str.contains('/')
        && !path_str.contains('\\')
        && !path_str.ends_with(".yaml")
        && !path_str.ends_with(".yml")
    {
        if let Some(yaml) = pipelines::get_builtin(&path_str) {
            return load_pipeline_from_str(yaml);
        }
    }

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::config(format!(
                "Pipeline '{}' not found. Built-in pipelines: {}. Or provide a path to a YAML file.",
                path.display(),
                pipelines::list_builtin().join(", ")
            ))
        } else {
            Error::config(format!(
                "Failed to read pipeline file '{}': {}",
                path.display(),
                e
            ))
        }
    })?;
    load_pipeline_from_str(&content)
}

/// Load a pipeline definition from a YAML string
pub fn load_pipeline_from_str(yaml: &str) -> Result<PipelineDefinition> {
    let def: PipelineDefinition = serde_yaml::from_str(yaml)?;
    validate_pipeline(&def)?;
    Ok(def)
}

/// Validate a pipeline definition
pub fn validate_pipeline(def: &PipelineDefinition) -> Result<()> {
    if def.name.trim().is_empty() {
        return Err(Error::invalid_value("name", "cannot be empty"));
    }

    if def.dataset.trim().is_empty() {
        return Err(Error::invalid_value("dataset", "cannot be empty"));
    }

    if def.resource.name.trim().is_empty() {
        return Err(Error::invalid_value("resource.name", "cannot be empty"));
    }

    if def.source.path.trim().is_empty() {
        return Err(Error::invalid_value("source.path", "cannot be empty"));
    }

    if def.load.batch_size == 0 {
        return Err(Error::invalid_value("load.batch_size", "must be at least 1"));
    }

    let PaginatorDefinition::PageNumber {
        page_param,
        base_page,
        maximum_page,
        ..
    } = &def.source.paginator;

    if page_param.trim().is_empty() {
        return Err(Error::invalid_value(
            "source.paginator.page_param",
            "cannot be empty",
        ));
    }

    if let Some(max) = maximum_page {
        if max < base_page {
            return Err(Error::invalid_value(
                "source.paginator.maximum_page",
                format!("{max} is below base_page {base_page}"),
            ));
        }
    }

    if def.source.http.timeout_secs == 0 {
        return Err(Error::invalid_value("source.http.timeout_secs", "must be at least 1"));
    }

    if def.source.http.rate_limit_rps == Some(0) {
        return Err(Error::invalid_value("source.http.rate_limit_rps", "must be at least 1"));
    }

    def.fetcher_config().validate()
}
