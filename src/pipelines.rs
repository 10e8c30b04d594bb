//! Built-in pipeline definitions embedded in the binary
//!
//! Lets users run `--pipeline ny_taxi` instead of pointing at a YAML file.

use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Pipeline run when none is named
pub const DEFAULT_PIPELINE: &str = "ny_taxi";

/// Built-in pipeline YAML definitions
pub static BUILTIN_PIPELINES: LazyLock<BTreeMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        let mut m = BTreeMap::new();

        // NYC taxi demo API
        m.insert("ny_taxi", include_str!("../pipelines/ny_taxi.yaml"));

        m
    });

/// Get a built-in pipeline by name
pub fn get_builtin(name: &str) -> Option<&'static str> {
    BUILTIN_PIPELINES.get(name).copied()
}

/// Check if a name refers to a built-in pipeline
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_PIPELINES.contains_key(name)
}

/// List all built-in pipeline names
pub fn list_builtin() -> Vec<&'static str> {
    BUILTIN_PIPELINES.keys().copied().collect()
}
