//! BigQuery destination
//!
//! Talks to the BigQuery v2 REST API. Rows are uploaded as load jobs into a
//! staging table and swapped over the target with a `WRITE_TRUNCATE` copy
//! job, which BigQuery applies atomically at table level.

use super::{Destination, TableRef};
use crate::auth::{ServiceAccountAuth, BIGQUERY_SCOPE};
use crate::config::BigQueryConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::http::{HttpClient, HttpClientConfig, RequestConfig, RetryPolicy};
use crate::normalize::Row;
use crate::schema::{ColumnType, TableSchema};
use crate::staging::{self, LoadFile};
use crate::types::DestinationKind;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

const MULTIPART_BOUNDARY: &str = "restload_load_file_boundary";

/// Resubmissions of a job insert after a transient failure
const JOB_INSERT_RETRIES: u32 = 3;

/// BigQuery REST destination
pub struct BigQueryDestination {
    client: HttpClient,
    config: BigQueryConfig,
    retry: RetryPolicy,
    jobs_submitted: AtomicU64,
}

impl BigQueryDestination {
    /// Create a destination authenticated with the configured service account
    pub fn new(config: BigQueryConfig) -> Result<Self> {
        let auth = ServiceAccountAuth::new(
            &config.credentials,
            config.token_url.clone(),
            BIGQUERY_SCOPE,
        );
        let retry = RetryPolicy::new(JOB_INSERT_RETRIES);
        let http = HttpClientConfig::new(config.api_url.clone())
            .with_timeout(config.request_timeout)
            .with_retry(retry);
        let client = HttpClient::new(http)?.with_auth(auth);

        Ok(Self {
            client,
            config,
            retry,
            jobs_submitted: AtomicU64::new(0),
        })
    }

    fn project(&self) -> &str {
        self.config.credentials.project_id()
    }

    fn table_ref_json(&self, table: &TableRef) -> Value {
        json!({
            "projectId": self.project(),
            "datasetId": table.dataset,
            "tableId": table.table,
        })
    }

    fn table_url(&self, table: &TableRef) -> String {
        format!(
            "/bigquery/v2/projects/{}/datasets/{}/tables/{}",
            self.project(),
            table.dataset,
            table.table
        )
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Client-chosen job id, unique per destination instance and run
    fn next_job_id(&self, table: &TableRef) -> String {
        let seq = self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        format!(
            "restload_{}_{}_{}",
            table.table,
            Utc::now().timestamp_micros(),
            seq
        )
    }

    fn job_reference(&self, job_id: &str) -> Value {
        json!({
            "projectId": self.project(),
            "jobId": job_id,
            "location": self.config.location,
        })
    }

    /// Insert a job under `job_id`. Failed inserts are resubmitted with the
    /// same id, so a job accepted before a lost response is never created
    /// twice; the 409 for the duplicate id means the earlier attempt landed.
    async fn insert_job(&self, url: &str, request: RequestConfig, job_id: &str) -> Result<Value> {
        let mut attempt = 0;
        loop {
            let result = self
                .client
                .request_json::<Value>(Method::POST, url, request.clone().retries(0))
                .await;

            match result {
                Ok(job) => return Ok(job),
                Err(e) if attempt > 0 && e.status() == Some(409) => {
                    debug!("Job {} was accepted by an earlier attempt", job_id);
                    return Ok(json!({ "jobReference": self.job_reference(job_id) }));
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        "Submitting job {} failed ({}), resubmitting in {:?}",
                        job_id, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(into_load_error(e)),
            }
        }
    }

    /// Upload a load file into `table` as a multipart load job
    async fn run_load_job(&self, table: &TableRef, file: &LoadFile) -> Result<()> {
        let job_id = self.next_job_id(table);
        let metadata = json!({
            "jobReference": self.job_reference(&job_id),
            "configuration": {
                "load": {
                    "destinationTable": self.table_ref_json(table),
                    "sourceFormat": file.source_format(),
                    "writeDisposition": "WRITE_APPEND",
                    "createDisposition": "CREATE_NEVER",
                }
            }
        });

        let body = multipart_related(&metadata, file)?;
        let url = format!(
            "/upload/bigquery/v2/projects/{}/jobs?uploadType=multipart",
            self.project()
        );
        let request = RequestConfig::new().bytes(
            format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            body,
        );

        let job = self.insert_job(&url, request, &job_id).await?;
        self.wait_for_job(&job).await
    }

    /// Run a copy job replacing `target` with the contents of `source`
    async fn run_copy_job(&self, source: &TableRef, target: &TableRef) -> Result<()> {
        let job_id = self.next_job_id(target);
        let body = json!({
            "jobReference": self.job_reference(&job_id),
            "configuration": {
                "copy": {
                    "sourceTable": self.table_ref_json(source),
                    "destinationTable": self.table_ref_json(target),
                    "writeDisposition": "WRITE_TRUNCATE",
                    "createDisposition": "CREATE_IF_NEEDED",
                }
            }
        });

        let url = format!("/bigquery/v2/projects/{}/jobs", self.project());
        let job = self
            .insert_job(&url, RequestConfig::new().json(body), &job_id)
            .await?;
        self.wait_for_job(&job).await
    }

    /// Poll a job until it reaches `DONE`
    async fn wait_for_job(&self, job: &Value) -> Result<()> {
        let job_id = job
            .pointer("/jobReference/jobId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::load("bigquery", "job response without jobReference.jobId"))?
            .to_string();
        let location = job
            .pointer("/jobReference/location")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.location)
            .to_string();

        let started = Instant::now();
        let mut current = job.clone();

        loop {
            if job_state(&current) == Some("DONE") {
                return job_result(&job_id, &current);
            }

            if started.elapsed() >= self.config.job_timeout {
                return Err(Error::load(
                    "bigquery",
                    format!(
                        "job {job_id} not done after {:?}",
                        self.config.job_timeout
                    ),
                ));
            }

            tokio::time::sleep(self.config.poll_interval).await;

            let url = format!("/bigquery/v2/projects/{}/jobs/{}", self.project(), job_id);
            let request = RequestConfig::new().query("location", location.clone());
            current = self
                .client
                .request_json(Method::GET, &url, request)
                .await
                .map_err(into_load_error)?;
            debug!("Job {} state: {:?}", job_id, job_state(&current));
        }
    }
}

impl std::fmt::Debug for BigQueryDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryDestination")
            .field("project", &self.project())
            .field("location", &self.config.location)
            .field("api_url", &self.config.api_url)
            .field("file_format", &self.config.file_format)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Destination for BigQueryDestination {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Bigquery
    }

    async fn ensure_dataset(&self, dataset: &str) -> Result<()> {
        let url = format!("/bigquery/v2/projects/{}/datasets", self.project());
        let body = json!({
            "datasetReference": {
                "projectId": self.project(),
                "datasetId": dataset,
            },
            "location": self.config.location,
        });

        debug!("Creating BigQuery dataset {}", dataset);
        match self.client.post_json(&url, body).await {
            Ok(_) => Ok(()),
            Err(e) if e.status() == Some(409) => {
                warn!("Dataset {} already exists", dataset);
                Ok(())
            }
            Err(e) => Err(into_load_error(e)),
        }
    }

    async fn create_or_replace_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()> {
        self.drop_table(table).await?;

        let url = format!(
            "/bigquery/v2/projects/{}/datasets/{}/tables",
            self.project(),
            table.dataset
        );
        let body = json!({
            "tableReference": self.table_ref_json(table),
            "schema": { "fields": table_fields(schema) },
        });

        debug!("Creating BigQuery table {}", table);
        self.client
            .post_json(&url, body)
            .await
            .map_err(into_load_error)?;
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

        let file = staging::encode(rows, schema, self.config.file_format)?;
        debug!(
            "Uploading {} rows ({} bytes) into {}",
            file.row_count,
            file.len(),
            table
        );
        self.run_load_job(table, &file).await?;
        Ok(file.row_count)
    }

    async fn replace_from_staging(&self, staging: &TableRef, target: &TableRef) -> Result<()> {
        debug!("Copying {} over {}", staging, target);
        self.run_copy_job(staging, target).await?;

        if let Err(e) = self.drop_table(staging).await {
            warn!("Failed to drop staging table {}: {}", staging, e);
        }
        Ok(())
    }

    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        match self.client.delete(&self.table_url(table)).await {
            Ok(_) => Ok(()),
            Err(e) if e.status() == Some(404) => {
                debug!("Table {} does not exist", table);
                Ok(())
            }
            Err(e) => Err(into_load_error(e)),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Errors from BigQuery calls surface as load failures
fn into_load_error(e: Error) -> Error {
    match e.kind() {
        ErrorKind::Load | ErrorKind::Config => e,
        _ => Error::load("bigquery", e.to_string()),
    }
}

fn bigquery_type(data_type: ColumnType) -> &'static str {
    match data_type {
        ColumnType::Bigint => "INT64",
        ColumnType::Double => "FLOAT64",
        ColumnType::Bool => "BOOL",
        ColumnType::Timestamp => "TIMESTAMP",
        ColumnType::Text | ColumnType::Json => "STRING",
    }
}

/// BigQuery `TableSchema.fields`
fn table_fields(schema: &TableSchema) -> Vec<Value> {
    schema
        .columns
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "type": bigquery_type(c.data_type),
                "mode": if c.nullable { "NULLABLE" } else { "REQUIRED" },
            })
        })
        .collect()
}

fn job_state(job: &Value) -> Option<&str> {
    job.pointer("/status/state").and_then(Value::as_str)
}

fn job_result(job_id: &str, job: &Value) -> Result<()> {
    let Some(error) = job.pointer("/status/errorResult") else {
        debug!("Job {} done", job_id);
        return Ok(());
    };

    let mut message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    if let Some(reason) = error.get("reason").and_then(Value::as_str) {
        message = format!("{reason}: {message}");
    }

    let details: Vec<&str> = job
        .pointer("/status/errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if !details.is_empty() {
        message = format!("{message} ({})", details.join("; "));
    }

    Err(Error::load("bigquery", format!("job {job_id} failed: {message}")))
}

/// Build a `multipart/related` body: JSON job metadata followed by the file
fn multipart_related(metadata: &Value, file: &LoadFile) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(file.len() + 512);
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    serde_json::to_writer(&mut body, metadata)?;
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type()).as_bytes());
    body.extend_from_slice(&file.data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use crate::types::LoaderFileFormat;
    use bytes::Bytes;

    #[test]
    fn test_table_fields() {
        let schema = TableSchema::from_columns(vec![
            Column::required("id", ColumnType::Bigint),
            Column::new("fare", ColumnType::Double),
            Column::new("pickup", ColumnType::Timestamp),
            Column::new("tags", ColumnType::Json),
        ]);
        let fields = table_fields(&schema);
        assert_eq!(fields[0], json!({"name": "id", "type": "INT64", "mode": "REQUIRED"}));
        assert_eq!(fields[1]["type"], "FLOAT64");
        assert_eq!(fields[2]["type"], "TIMESTAMP");
        assert_eq!(fields[3], json!({"name": "tags", "type": "STRING", "mode": "NULLABLE"}));
    }

    #[test]
    fn test_job_result() {
        assert!(job_result("j1", &json!({"status": {"state": "DONE"}})).is_ok());

        let failed = json!({
            "status": {
                "state": "DONE",
                "errorResult": {"reason": "invalid", "message": "bad row"},
                "errors": [{"message": "row 3: no such field"}]
            }
        });
        let err = job_result("j2", &failed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
        let text = err.to_string();
        assert!(text.contains("job j2 failed: invalid: bad row"));
        assert!(text.contains("row 3: no such field"));
    }

    #[test]
    fn test_multipart_related_layout() {
        let file = LoadFile {
            format: LoaderFileFormat::Jsonl,
            data: Bytes::from_static(b"{\"id\":1}\n"),
            row_count: 1,
        };
        let body = multipart_related(&json!({"a": 1}), &file).unwrap();
        let text = String::from_utf8(body).unwrap();

        assert!(text.starts_with("--restload_load_file_boundary\r\n"));
        assert!(text.contains("{\"a\":1}\r\n--restload_load_file_boundary\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n\r\n{\"id\":1}\n"));
        assert!(text.ends_with("\r\n--restload_load_file_boundary--\r\n"));
    }

    #[test]
    fn test_into_load_error() {
        let err = into_load_error(Error::http_status(403, "denied"));
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(err.to_string().contains("403"));

        let err = into_load_error(Error::auth("bad token"));
        assert!(matches!(err, Error::Auth { .. }));
    }
}
