//! DuckDB destination
//!
//! Datasets map onto DuckDB schemas. All statements run on one connection
//! guarded by a mutex, so the destination can be shared across awaits.

use super::{Destination, TableRef};
use crate::error::{Error, Result};
use crate::normalize::Row;
use crate::schema::{coerce_row, Cell, ColumnType, TableSchema};
use crate::types::DestinationKind;
use async_trait::async_trait;
use duckdb::types::{TimeUnit, Value as DbValue};
use duckdb::Connection;
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// DuckDB-backed destination
pub struct DuckDbDestination {
    conn: Mutex<Connection>,
    location: String,
}

impl DuckDbDestination {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| Error::load("duckdb", format!("failed to open {}: {e}", path.display())))?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: path.display().to_string(),
        })
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::load("duckdb", format!("failed to open in-memory database: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: ":memory:".to_string(),
        })
    }

    /// Database file path, or `:memory:`
    pub fn location(&self) -> &str {
        &self.location
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::load("duckdb", "connection lock poisoned"))
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Whether a table exists
    pub fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = ? AND table_name = ?",
            [&table.dataset, &table.table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Number of rows in a table
    pub fn count_rows(&self, table: &TableRef) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", qualified(table)), [], |row| {
                row.get(0)
            })?;
        Ok(count.max(0) as u64)
    }

    /// Column names of a table in declaration order
    pub fn column_names(&self, table: &TableRef) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
        )?;
        let names = stmt
            .query_map([&table.dataset, &table.table], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Run a query and return each row as a JSON object
    pub fn query_json(&self, sql: &str) -> Result<Vec<Value>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        let names: Vec<String> = rows
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default();

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = serde_json::Map::new();
            for (i, name) in names.iter().enumerate() {
                let value: DbValue = row.get(i)?;
                object.insert(name.clone(), db_value_to_json(value));
            }
            out.push(Value::Object(object));
        }
        Ok(out)
    }
}

impl std::fmt::Debug for DuckDbDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbDestination")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Destination for DuckDbDestination {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Duckdb
    }

    async fn ensure_dataset(&self, dataset: &str) -> Result<()> {
        debug!("Ensuring DuckDB schema {}", dataset);
        let conn = self.lock()?;
        conn.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {};", quote_ident(dataset)))?;
        Ok(())
    }

    async fn create_or_replace_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()> {
        if schema.is_empty() {
            return Err(Error::load("duckdb", format!("table {table} has no columns")));
        }

        let sql = create_table_sql(table, schema);
        debug!("Creating DuckDB table {}: {}", table, sql);
        let conn = self.lock()?;
        conn.execute_batch(&sql)?;
        Ok(())
    }

    async fn insert_rows(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        rows: &[Row],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let columns: Vec<String> = schema.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified(table),
            columns.join(", "),
            placeholders
        );

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                let values = coerce_row(row, schema).into_iter().map(cell_to_db_value);
                stmt.execute(duckdb::params_from_iter(values))?;
            }
        }
        tx.commit()?;

        debug!("Inserted {} rows into {}", rows.len(), table);
        Ok(rows.len())
    }

    async fn replace_from_staging(&self, staging: &TableRef, target: &TableRef) -> Result<()> {
        if staging.dataset != target.dataset {
            return Err(Error::load(
                "duckdb",
                format!("cannot swap {staging} into another schema as {target}"),
            ));
        }

        debug!("Swapping {} into {}", staging, target);
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}; ALTER TABLE {} RENAME TO {};",
            qualified(target),
            qualified(staging),
            quote_ident(&target.table)
        ))?;
        tx.commit()?;
        Ok(())
    }

    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        debug!("Dropping DuckDB table {}", table);
        let conn = self.lock()?;
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", qualified(table)))?;
        Ok(())
    }
}

// ============================================================================
// SQL helpers
// ============================================================================

/// Quote an identifier, doubling embedded quotes
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.dataset), quote_ident(&table.table))
}

fn sql_type(data_type: ColumnType) -> &'static str {
    match data_type {
        ColumnType::Bigint => "BIGINT",
        ColumnType::Double => "DOUBLE",
        ColumnType::Bool => "BOOLEAN",
        ColumnType::Timestamp => "TIMESTAMP",
        ColumnType::Text | ColumnType::Json => "VARCHAR",
    }
}

fn create_table_sql(table: &TableRef, schema: &TableSchema) -> String {
    let columns: Vec<String> = schema
        .columns
        .iter()
        .map(|c| {
            let null = if c.nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", quote_ident(&c.name), sql_type(c.data_type), null)
        })
        .collect();
    format!(
        "CREATE OR REPLACE TABLE {} ({});",
        qualified(table),
        columns.join(", ")
    )
}

/// Timestamps are bound as UTC text and cast by DuckDB on insert
fn cell_to_db_value(cell: Cell) -> DbValue {
    match cell {
        Cell::Null => DbValue::Null,
        Cell::Bigint(v) => DbValue::BigInt(v),
        Cell::Double(v) => DbValue::Double(v),
        Cell::Bool(v) => DbValue::Boolean(v),
        Cell::Text(s) | Cell::Json(s) => DbValue::Text(s),
        Cell::Timestamp(ts) => DbValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
    }
}

fn db_value_to_json(value: DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Boolean(b) => Value::Bool(b),
        DbValue::TinyInt(i) => Value::from(i),
        DbValue::SmallInt(i) => Value::from(i),
        DbValue::Int(i) => Value::from(i),
        DbValue::BigInt(i) => Value::from(i),
        DbValue::HugeInt(i) => Value::String(i.to_string()),
        DbValue::UTinyInt(i) => Value::from(i),
        DbValue::USmallInt(i) => Value::from(i),
        DbValue::UInt(i) => Value::from(i),
        DbValue::UBigInt(i) => Value::from(i),
        DbValue::Float(f) => {
            serde_json::Number::from_f64(f64::from(f)).map_or(Value::Null, Value::Number)
        }
        DbValue::Double(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        DbValue::Text(s) => Value::String(s),
        DbValue::Timestamp(unit, i) => {
            let micros = match unit {
                TimeUnit::Second => i.saturating_mul(1_000_000),
                TimeUnit::Millisecond => i.saturating_mul(1_000),
                TimeUnit::Microsecond => i,
                TimeUnit::Nanosecond => i / 1_000,
            };
            chrono::DateTime::from_timestamp_micros(micros)
                .map(|dt| Value::String(crate::schema::format_timestamp(&dt)))
                .unwrap_or(Value::from(i))
        }
        other => Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("rides"), "\"rides\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_create_table_sql() {
        let schema = TableSchema::from_columns(vec![
            Column::required("id", ColumnType::Bigint),
            Column::new("pickup", ColumnType::Timestamp),
            Column::new("tags", ColumnType::Json),
        ]);
        let sql = create_table_sql(&TableRef::new("taxi_rides", "rides"), &schema);
        assert_eq!(
            sql,
            "CREATE OR REPLACE TABLE \"taxi_rides\".\"rides\" \
             (\"id\" BIGINT NOT NULL, \"pickup\" TIMESTAMP, \"tags\" VARCHAR);"
        );
    }

    #[test]
    fn test_db_value_to_json() {
        assert_eq!(db_value_to_json(DbValue::Null), Value::Null);
        assert_eq!(db_value_to_json(DbValue::Boolean(true)), Value::Bool(true));
        assert_eq!(db_value_to_json(DbValue::BigInt(42)), serde_json::json!(42));
        assert_eq!(
            db_value_to_json(DbValue::Timestamp(TimeUnit::Microsecond, 1_245_021_780_000_000)),
            serde_json::json!("2009-06-14T23:23:00.000000Z")
        );
    }
}
