//! Load-file encoding
//!
//! Rows are coerced to their column types and encoded into an in-memory
//! load file: newline-delimited JSON or a snappy-compressed Parquet file.

use crate::error::Result;
use crate::normalize::Row;
use crate::schema::{coerce_row, Cell, ColumnType, TableSchema};
use crate::types::LoaderFileFormat;
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

// ============================================================================
// Load File
// ============================================================================

/// An encoded batch of rows ready for upload
#[derive(Debug, Clone)]
pub struct LoadFile {
    /// Encoding of `data`
    pub format: LoaderFileFormat,
    /// File contents
    pub data: Bytes,
    /// Number of rows encoded
    pub row_count: usize,
}

impl LoadFile {
    /// MIME type used when uploading the file
    pub fn content_type(&self) -> &'static str {
        match self.format {
            LoaderFileFormat::Jsonl => "application/json",
            LoaderFileFormat::Parquet => "application/octet-stream",
        }
    }

    /// BigQuery `sourceFormat` for this file
    pub fn source_format(&self) -> &'static str {
        match self.format {
            LoaderFileFormat::Jsonl => "NEWLINE_DELIMITED_JSON",
            LoaderFileFormat::Parquet => "PARQUET",
        }
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the file is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ============================================================================
// Parquet Writer Configuration
// ============================================================================

/// Parquet writer configuration
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    /// Compression codec
    pub compression: Compression,
    /// Maximum rows per row group
    pub max_row_group_size: usize,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            compression: Compression::SNAPPY,
            max_row_group_size: 1024 * 1024,
        }
    }
}

impl ParquetWriterConfig {
    /// Set compression codec
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set max row group size
    #[must_use]
    pub fn with_max_row_group_size(mut self, size: usize) -> Self {
        self.max_row_group_size = size;
        self
    }

    fn build_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.max_row_group_size)
            .build()
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode rows in `format`, coercing every value to its column type
pub fn encode(rows: &[Row], schema: &TableSchema, format: LoaderFileFormat) -> Result<LoadFile> {
    match format {
        LoaderFileFormat::Jsonl => encode_jsonl(rows, schema),
        LoaderFileFormat::Parquet => encode_parquet(rows, schema, &ParquetWriterConfig::default()),
    }
}

/// Encode rows as newline-delimited JSON objects
pub fn encode_jsonl(rows: &[Row], schema: &TableSchema) -> Result<LoadFile> {
    let mut data = Vec::new();

    for row in rows {
        let object: serde_json::Map<String, serde_json::Value> = schema
            .columns
            .iter()
            .zip(coerce_row(row, schema))
            .filter(|(_, cell)| !cell.is_null())
            .map(|(column, cell)| (column.name.clone(), cell.to_json()))
            .collect();
        serde_json::to_writer(&mut data, &object)?;
        data.push(b'\n');
    }

    Ok(LoadFile {
        format: LoaderFileFormat::Jsonl,
        data: Bytes::from(data),
        row_count: rows.len(),
    })
}

/// Encode rows as a single-batch Parquet file
pub fn encode_parquet(
    rows: &[Row],
    schema: &TableSchema,
    config: &ParquetWriterConfig,
) -> Result<LoadFile> {
    let batch = to_record_batch(rows, schema)?;

    let mut data = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut data, batch.schema(), Some(config.build_properties()))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(LoadFile {
        format: LoaderFileFormat::Parquet,
        data: Bytes::from(data),
        row_count: rows.len(),
    })
}

/// Arrow schema for a table schema
pub fn arrow_schema(schema: &TableSchema) -> Schema {
    let fields: Vec<Field> = schema
        .columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(c.data_type), c.nullable))
        .collect();
    Schema::new(fields)
}

fn arrow_type(data_type: ColumnType) -> DataType {
    match data_type {
        ColumnType::Bigint => DataType::Int64,
        ColumnType::Double => DataType::Float64,
        ColumnType::Bool => DataType::Boolean,
        ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        ColumnType::Text | ColumnType::Json => DataType::Utf8,
    }
}

/// Build one record batch holding every row
pub fn to_record_batch(rows: &[Row], schema: &TableSchema) -> Result<RecordBatch> {
    let cells: Vec<Vec<Cell>> = rows.iter().map(|row| coerce_row(row, schema)).collect();

    let arrays: Vec<ArrayRef> = schema
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| build_array(cells.iter().map(|row| &row[i]), column.data_type))
        .collect();

    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    let batch =
        RecordBatch::try_new_with_options(Arc::new(arrow_schema(schema)), arrays, &options)?;
    Ok(batch)
}

/// Build an Arrow array from coerced cells
///
/// Cells that did not coerce to the column type are written as null.
fn build_array<'a>(cells: impl Iterator<Item = &'a Cell>, data_type: ColumnType) -> ArrayRef {
    match data_type {
        ColumnType::Bigint => {
            let arr: Int64Array = cells
                .map(|c| match c {
                    Cell::Bigint(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Arc::new(arr)
        }
        ColumnType::Double => {
            let arr: Float64Array = cells
                .map(|c| match c {
                    Cell::Double(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Arc::new(arr)
        }
        ColumnType::Bool => {
            let arr: BooleanArray = cells
                .map(|c| match c {
                    Cell::Bool(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Arc::new(arr)
        }
        ColumnType::Timestamp => {
            let arr: TimestampMicrosecondArray = cells
                .map(|c| match c {
                    Cell::Timestamp(ts) => Some(ts.timestamp_micros()),
                    _ => None,
                })
                .collect();
            Arc::new(arr.with_timezone("UTC"))
        }
        ColumnType::Text | ColumnType::Json => {
            let arr: StringArray = cells
                .map(|c| match c {
                    Cell::Text(s) | Cell::Json(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            Arc::new(arr)
        }
    }
}
