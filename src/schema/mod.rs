//! Schema inference module
//!
//! Derives the destination table schema from normalized rows.
//!
//! # Features
//!
//! - **Type Inference**: bigint, double, bool, text, timestamp, json
//! - **Schema Union**: every field seen in any row becomes a column
//! - **Type Merging**: bigint widens to double, other conflicts become text
//! - **Nullable Detection**: columns missing or null in some row are nullable
//! - **Coercion**: values are converted to their column's final type

mod inference;
mod types;
mod values;

pub use inference::{infer_schema, SchemaInferrer};
pub use types::{Column, ColumnType, TableSchema};
pub use values::{coerce, coerce_row, format_timestamp, parse_timestamp, Cell};
