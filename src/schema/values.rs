//! Typed cell values
//!
//! Every JSON value is coerced to its column's final type before it is
//! written, so all destinations and load files agree on representation.

use super::types::{ColumnType, TableSchema};
use crate::normalize::Row;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Naive layouts accepted as UTC timestamps
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A value coerced to a column type
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Missing or null
    Null,
    /// Integer value
    Bigint(i64),
    /// Float value
    Double(f64),
    /// Boolean value
    Bool(bool),
    /// Text value
    Text(String),
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
    /// Serialized JSON
    Json(String),
}

impl Cell {
    /// Whether this cell is null
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// JSON form used in newline-delimited load files
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Bigint(v) => Value::from(*v),
            Cell::Double(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
            Cell::Bool(v) => Value::Bool(*v),
            Cell::Text(v) | Cell::Json(v) => Value::String(v.clone()),
            Cell::Timestamp(v) => Value::String(format_timestamp(v)),
        }
    }
}

/// Parse an ISO 8601 timestamp; naive values are taken as UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    // at least "YYYY-MM-DDTHH:MM"
    if s.len() < 16 {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// RFC 3339 with microseconds and a `Z` suffix
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Coerce a row value to `data_type`
pub fn coerce(value: Option<&Value>, data_type: ColumnType) -> Cell {
    let Some(value) = value else {
        return Cell::Null;
    };
    if value.is_null() {
        return Cell::Null;
    }

    match data_type {
        ColumnType::Bigint => value
            .as_i64()
            .map_or_else(|| Cell::Text(value.to_string()), Cell::Bigint),
        ColumnType::Double => value
            .as_f64()
            .map_or_else(|| Cell::Text(value.to_string()), Cell::Double),
        ColumnType::Bool => value
            .as_bool()
            .map_or_else(|| Cell::Text(value.to_string()), Cell::Bool),
        ColumnType::Timestamp => value
            .as_str()
            .and_then(parse_timestamp)
            .map_or(Cell::Null, Cell::Timestamp),
        ColumnType::Text => match value {
            Value::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        },
        ColumnType::Json => Cell::Json(value.to_string()),
    }
}

/// Coerce every column of a row, in schema order
pub fn coerce_row(row: &Row, schema: &TableSchema) -> Vec<Cell> {
    schema
        .columns
        .iter()
        .map(|column| coerce(row.get(&column.name), column.data_type))
        .collect()
}
