//! JSON page decoder
//!
//! Turns a response body into the list of records it carries.

use crate::error::{Error, Result};
use crate::types::JsonObject;
use serde_json::Value;

/// Object keys tried, in order, for the record list when no path is configured
pub const DEFAULT_RECORD_KEYS: &[&str] = &["data", "items", "results", "records", "rows"];

/// Trait for decoding response bodies into records
pub trait RecordDecoder: Send + Sync {
    /// Parse the response body into a single JSON value (full response)
    fn decode_raw(&self, body: &str) -> Result<Value>;

    /// Pull the records out of an already parsed response
    fn extract_records(&self, value: &Value) -> Result<Vec<JsonObject>>;

    /// Decode the response body into a list of records
    fn decode(&self, body: &str) -> Result<Vec<JsonObject>> {
        let value = self.decode_raw(body)?;
        self.extract_records(&value)
    }
}

// ============================================================================
// JSON Decoder
// ============================================================================

/// JSON decoder with optional record path extraction
#[derive(Debug, Clone, Default)]
pub struct JsonDecoder {
    /// Dot path or JSONPath to the record list
    record_path: Option<String>,
}

impl JsonDecoder {
    /// Create a new JSON decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON decoder with a record path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            record_path: Some(path.into()),
        }
    }

    /// Create a decoder from an optional path
    pub fn from_path(path: Option<&str>) -> Self {
        Self {
            record_path: path.map(String::from),
        }
    }

    /// Configured record path
    pub fn record_path(&self) -> Option<&str> {
        self.record_path.as_deref()
    }

    fn locate(&self, value: &Value) -> Result<Vec<Value>> {
        if let Value::Array(arr) = value {
            return Ok(arr.clone());
        }

        if let Some(path) = &self.record_path {
            if path.contains('*') && !path.contains("[-") {
                return extract_with_jsonpath(value, path);
            }
            return Ok(match extract_path_value(value, path) {
                Some(Value::Array(arr)) => arr,
                Some(Value::Null) | None => vec![],
                Some(v) => vec![v],
            });
        }

        let Value::Object(map) = value else {
            return Ok(vec![value.clone()]);
        };

        for key in DEFAULT_RECORD_KEYS {
            if let Some(Value::Array(arr)) = map.get(*key) {
                return Ok(arr.clone());
            }
        }

        if let Some(arr) = map.values().find_map(Value::as_array) {
            return Ok(arr.clone());
        }

        Ok(vec![value.clone()])
    }
}

impl RecordDecoder for JsonDecoder {
    fn decode_raw(&self, body: &str) -> Result<Value> {
        Ok(serde_json::from_str(body)?)
    }

    fn extract_records(&self, value: &Value) -> Result<Vec<JsonObject>> {
        Ok(self.locate(value)?.into_iter().map(into_record).collect())
    }
}

/// Objects pass through; anything else is wrapped as `{"value": ...}`
fn into_record(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = JsonObject::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Extract a value using simple dot-notation path (`$.a.b`, `items[0]`, `items[-1]`)
pub fn extract_path_value(value: &Value, path: &str) -> Option<Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    if path.is_empty() || path == "$" {
        return Some(value.clone());
    }

    let mut current = value;
    for part in path.split('.') {
        if let Some(bracket_pos) = part.find('[') {
            let name = &part[..bracket_pos];
            let index_str = part[bracket_pos + 1..].strip_suffix(']')?;

            if !name.is_empty() {
                current = current.get(name)?;
            }

            if index_str == "*" {
                return Some(current.clone());
            }

            let index = index_str.parse::<i64>().ok()?;
            let Value::Array(arr) = current else {
                return None;
            };
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_possible_wrap
            )]
            let idx = if index < 0 {
                let from_end = arr.len() as i64 + index;
                if from_end < 0 {
                    return None;
                }
                from_end as usize
            } else {
                index as usize
            };
            current = arr.get(idx)?;
        } else {
            current = current.get(part)?;
        }
    }

    Some(current.clone())
}

/// Extract a value at `path` and read it as an unsigned integer
pub fn extract_path_u64(value: &Value, path: &str) -> Option<u64> {
    match extract_path_value(value, path)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extract records using jsonpath-rust
fn extract_with_jsonpath(value: &Value, path: &str) -> Result<Vec<Value>> {
    use jsonpath_rust::JsonPath;

    let jp = JsonPath::try_from(path).map_err(|e| Error::JsonPath {
        message: format!("Invalid JSONPath: {e}"),
    })?;

    match jp.find(value) {
        Value::Array(arr) => Ok(arr),
        Value::Null => Ok(vec![]),
        other => Ok(vec![other]),
    }
}
