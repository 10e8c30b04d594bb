//! Record normalization
//!
//! Source records become flat rows: identifiers are snake_cased, nested
//! objects are flattened into `parent__child` columns and arrays are kept
//! whole (they are stored as JSON text). Two source fields that land on the
//! same column are rejected rather than merged.

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Separator joining a parent field and its nested child
pub const NESTING_SEPARATOR: &str = "__";

/// A flattened record with normalized column names, in first-seen order
pub type Row = JsonObject;

static CAMEL_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([^_])([A-Z][a-z]+)").unwrap());
static CAMEL_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([a-z0-9])([A-Z])").unwrap());
static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-zA-Z0-9_]+").unwrap());
static UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new("__+").unwrap());

/// Normalize a single identifier to snake_case
///
/// `Trip_Pickup_DateTime` becomes `trip_pickup_date_time`, `vendorID`
/// becomes `vendor_id` and `2nd value` becomes `_2nd_value`.
pub fn normalize_identifier(name: &str) -> String {
    let ident = CAMEL_WORD.replace_all(name.trim(), "${1}_${2}");
    let ident = CAMEL_TAIL.replace_all(&ident, "${1}_${2}");
    let ident = NON_ALPHANUMERIC.replace_all(&ident, "_");
    let ident = UNDERSCORES.replace_all(&ident, "_").to_lowercase();
    let ident = ident.trim_end_matches('_');

    if ident.is_empty() {
        return "_".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("_{ident}");
    }
    ident.to_string()
}

/// Flatten one source record into a row
pub fn normalize_record(record: &JsonObject) -> Result<Row> {
    let mut row = Row::new();
    let mut sources = HashMap::new();
    flatten_into(&mut row, &mut sources, None, record)?;
    Ok(row)
}

/// Flatten a batch of source records
pub fn normalize_records<'a, I>(records: I) -> Result<Vec<Row>>
where
    I: IntoIterator<Item = &'a JsonObject>,
{
    records.into_iter().map(normalize_record).collect()
}

/// `parent` is the (column, source path) pair of the enclosing object;
/// `sources` maps each emitted column back to its source path
fn flatten_into(
    row: &mut Row,
    sources: &mut HashMap<String, String>,
    parent: Option<(&str, &str)>,
    object: &JsonObject,
) -> Result<()> {
    for (key, value) in object {
        let (name, source) = match parent {
            Some((column, path)) => (
                format!("{column}{NESTING_SEPARATOR}{}", normalize_identifier(key)),
                format!("{path}.{key}"),
            ),
            None => (normalize_identifier(key), key.clone()),
        };

        match value {
            JsonValue::Object(child) => flatten_into(row, sources, Some((&name, &source)), child)?,
            other => {
                if let Some(first) = sources.insert(name.clone(), source.clone()) {
                    return Err(Error::ColumnCollision {
                        column: name,
                        first,
                        second: source,
                    });
                }
                row.insert(name, other.clone());
            }
        }
    }
    Ok(())
}
