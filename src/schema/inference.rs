//! Schema inference from normalized rows

use super::types::{Column, ColumnType, TableSchema};
use super::values::parse_timestamp;
use crate::normalize::Row;
use serde_json::Value;
use std::collections::HashMap;

/// Schema inferrer with configuration options
#[derive(Debug, Clone)]
pub struct SchemaInferrer {
    /// Detect ISO 8601 timestamps in strings
    detect_timestamps: bool,
}

impl Default for SchemaInferrer {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-column accumulator
struct Observed {
    name: String,
    data_type: Option<ColumnType>,
    non_null: usize,
}

impl SchemaInferrer {
    /// Create a new schema inferrer with default settings
    pub fn new() -> Self {
        Self {
            detect_timestamps: true,
        }
    }

    /// Enable/disable timestamp detection
    #[must_use]
    pub fn with_timestamp_detection(mut self, enabled: bool) -> Self {
        self.detect_timestamps = enabled;
        self
    }

    /// Infer one schema covering every row
    ///
    /// Columns are the union of all row keys in first-seen order. A column
    /// is non-nullable only when every row has a non-null value for it.
    pub fn infer(&self, rows: &[Row]) -> TableSchema {
        let mut observed: Vec<Observed> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for row in rows {
            for (key, value) in row {
                let slot = *index.entry(key.clone()).or_insert_with(|| {
                    observed.push(Observed {
                        name: key.clone(),
                        data_type: None,
                        non_null: 0,
                    });
                    observed.len() - 1
                });
                let column = &mut observed[slot];

                if let Some(found) = self.infer_value_type(value) {
                    column.non_null += 1;
                    column.data_type = Some(match column.data_type {
                        Some(existing) => existing.merge_with(found),
                        None => found,
                    });
                }
            }
        }

        let columns = observed
            .into_iter()
            .map(|o| Column {
                name: o.name,
                data_type: o.data_type.unwrap_or(ColumnType::Text),
                nullable: o.non_null < rows.len(),
            })
            .collect();

        TableSchema::from_columns(columns)
    }

    /// Type of a single value; `None` for null
    pub fn infer_value_type(&self, value: &Value) -> Option<ColumnType> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Number(n) => {
                if n.is_i64() {
                    Some(ColumnType::Bigint)
                } else {
                    Some(ColumnType::Double)
                }
            }
            Value::String(s) => {
                if self.detect_timestamps && parse_timestamp(s).is_some() {
                    Some(ColumnType::Timestamp)
                } else {
                    Some(ColumnType::Text)
                }
            }
            Value::Array(_) | Value::Object(_) => Some(ColumnType::Json),
        }
    }
}

/// Infer a schema with default settings (convenience function)
pub fn infer_schema(rows: &[Row]) -> TableSchema {
    SchemaInferrer::new().infer(rows)
}
