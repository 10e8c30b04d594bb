//! Tests for destination module

use super::*;
use crate::config::{BigQueryConfig, GcpCredentials};
use crate::error::ErrorKind;
use crate::normalize::normalize_record;
use crate::schema::infer_schema;
use crate::types::LoaderFileFormat;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_string_contains, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const TEST_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pem");

fn rows(values: Value) -> Vec<Row> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|v| normalize_record(v.as_object().unwrap()).unwrap())
        .collect()
}

// ============================================================================
// TableRef Tests
// ============================================================================

#[test]
fn test_table_ref() {
    let table = TableRef::new("taxi_rides", "rides");
    assert_eq!(table.to_string(), "taxi_rides.rides");

    let staging = table.sibling("rides__staging_1");
    assert_eq!(staging.dataset, "taxi_rides");
    assert_eq!(staging.table, "rides__staging_1");
}

// ============================================================================
// DuckDB Tests
// ============================================================================

#[tokio::test]
async fn test_duckdb_create_insert_and_query() {
    let db = DuckDbDestination::in_memory().unwrap();
    assert_eq!(db.kind(), DestinationKind::Duckdb);
    assert_eq!(db.location(), ":memory:");

    let rows = rows(json!([
        {"id": 1, "vendor": "VTS", "pickup": "2009-06-14 23:23:00", "tags": ["a", "b"]},
        {"id": 2, "vendor": null, "pickup": "2009-06-18T17:35:00Z", "fare": 4.5}
    ]));
    let schema = infer_schema(&rows);
    let table = TableRef::new("taxi_rides", "rides");

    db.ensure_dataset("taxi_rides").await.unwrap();
    db.create_or_replace_table(&table, &schema).await.unwrap();
    let written = db.insert_rows(&table, &schema, &rows).await.unwrap();

    assert_eq!(written, 2);
    assert_eq!(db.count_rows(&table).unwrap(), 2);
    assert_eq!(
        db.column_names(&table).unwrap(),
        vec!["id", "vendor", "pickup", "tags", "fare"]
    );

    let result = db
        .query_json("SELECT * FROM taxi_rides.rides ORDER BY id")
        .unwrap();
    assert_eq!(
        result[0],
        json!({
            "id": 1,
            "vendor": "VTS",
            "pickup": "2009-06-14T23:23:00.000000Z",
            "tags": "[\"a\",\"b\"]",
            "fare": null
        })
    );
    assert_eq!(result[1]["vendor"], Value::Null);
    assert_eq!(result[1]["pickup"], json!("2009-06-18T17:35:00.000000Z"));
    assert_eq!(result[1]["fare"], json!(4.5));
}

#[tokio::test]
async fn test_duckdb_ensure_dataset_is_idempotent() {
    let db = DuckDbDestination::in_memory().unwrap();
    assert_ok!(db.ensure_dataset("taxi_rides").await);
    assert_ok!(db.ensure_dataset("taxi_rides").await);
}

#[tokio::test]
async fn test_duckdb_replace_from_staging() {
    let db = DuckDbDestination::in_memory().unwrap();
    db.ensure_dataset("ds").await.unwrap();

    let target = TableRef::new("ds", "rides");
    let old_rows = rows(json!([{"id": 1, "old_col": "x"}, {"id": 2, "old_col": "y"}]));
    let old_schema = infer_schema(&old_rows);
    db.create_or_replace_table(&target, &old_schema).await.unwrap();
    db.insert_rows(&target, &old_schema, &old_rows).await.unwrap();

    let staging = target.sibling("rides__staging_1");
    let new_rows = rows(json!([{"id": 10, "new_col": true}]));
    let new_schema = infer_schema(&new_rows);
    db.create_or_replace_table(&staging, &new_schema).await.unwrap();
    db.insert_rows(&staging, &new_schema, &new_rows).await.unwrap();

    db.replace_from_staging(&staging, &target).await.unwrap();

    assert!(!db.table_exists(&staging).unwrap());
    assert_eq!(db.count_rows(&target).unwrap(), 1);
    assert_eq!(db.column_names(&target).unwrap(), vec!["id", "new_col"]);
}

#[tokio::test]
async fn test_duckdb_replace_without_existing_target() {
    let db = DuckDbDestination::in_memory().unwrap();
    db.ensure_dataset("ds").await.unwrap();

    let staging = TableRef::new("ds", "rides__staging_1");
    let rows = rows(json!([{"id": 1}]));
    let schema = infer_schema(&rows);
    db.create_or_replace_table(&staging, &schema).await.unwrap();
    db.insert_rows(&staging, &schema, &rows).await.unwrap();

    let target = TableRef::new("ds", "rides");
    db.replace_from_staging(&staging, &target).await.unwrap();
    assert_eq!(db.count_rows(&target).unwrap(), 1);
}

#[tokio::test]
async fn test_duckdb_replace_across_schemas_fails() {
    let db = DuckDbDestination::in_memory().unwrap();
    let err = assert_err!(
        db.replace_from_staging(&TableRef::new("a", "t"), &TableRef::new("b", "t"))
            .await
    );
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[tokio::test]
async fn test_duckdb_drop_missing_table_is_ok() {
    let db = DuckDbDestination::in_memory().unwrap();
    db.ensure_dataset("ds").await.unwrap();
    assert_ok!(db.drop_table(&TableRef::new("ds", "nope")).await);
}

#[tokio::test]
async fn test_duckdb_empty_schema_is_rejected() {
    let db = DuckDbDestination::in_memory().unwrap();
    db.ensure_dataset("ds").await.unwrap();
    let err = db
        .create_or_replace_table(&TableRef::new("ds", "t"), &TableSchema::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[tokio::test]
async fn test_duckdb_insert_into_missing_table_is_load_error() {
    let db = DuckDbDestination::in_memory().unwrap();
    let rows = rows(json!([{"id": 1}]));
    let schema = infer_schema(&rows);
    let err = db
        .insert_rows(&TableRef::new("main", "missing"), &schema, &rows)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[tokio::test]
async fn test_duckdb_file_persists() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("taxi.duckdb");
    let table = TableRef::new("taxi_rides", "rides");

    {
        let db = DuckDbDestination::open(&file).unwrap();
        let rows = rows(json!([{"id": 1}, {"id": 2}, {"id": 3}]));
        let schema = infer_schema(&rows);
        db.ensure_dataset("taxi_rides").await.unwrap();
        db.create_or_replace_table(&table, &schema).await.unwrap();
        db.insert_rows(&table, &schema, &rows).await.unwrap();
    }

    let reopened = DuckDbDestination::open(&file).unwrap();
    assert_eq!(reopened.count_rows(&table).unwrap(), 3);
}

#[test]
fn test_connect_duckdb() {
    let dest = connect(&DestinationConfig::duckdb_in_memory()).unwrap();
    assert_eq!(dest.kind(), DestinationKind::Duckdb);
}

// ============================================================================
// BigQuery Tests
// ============================================================================

fn bigquery_config(server: &MockServer) -> BigQueryConfig {
    let credentials = GcpCredentials::new(
        "loader@demo-project.iam.gserviceaccount.com",
        TEST_KEY,
        "demo-project",
    )
    .unwrap();
    BigQueryConfig::new(credentials)
        .with_api_url(server.uri())
        .with_token_url(format!("{}/token", server.uri()))
        .with_poll_interval(Duration::from_millis(10))
        .with_job_timeout(Duration::from_secs(5))
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.test",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

fn job(id: &str, state: &str) -> Value {
    json!({
        "jobReference": {"projectId": "demo-project", "jobId": id, "location": "US"},
        "status": {"state": state}
    })
}

#[test]
fn test_connect_bigquery_does_no_io() {
    let server_uri = "http://127.0.0.1:9";
    let credentials =
        GcpCredentials::new("loader@demo.iam.gserviceaccount.com", TEST_KEY, "demo").unwrap();
    let config = BigQueryConfig::new(credentials)
        .with_api_url(server_uri)
        .with_token_url(format!("{server_uri}/token"));

    let dest = connect(&DestinationConfig::BigQuery(config)).unwrap();
    assert_eq!(dest.kind(), DestinationKind::Bigquery);
}

#[tokio::test]
async fn test_bigquery_ensure_dataset_exists_is_ok() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/demo-project/datasets"))
        .and(header("authorization", "Bearer ya29.test"))
        .and(body_string_contains("\"datasetId\":\"taxi_rides\""))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": {"code": 409, "message": "Already Exists"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dest = BigQueryDestination::new(bigquery_config(&server)).unwrap();
    dest.ensure_dataset("taxi_rides").await.unwrap();
}

#[tokio::test]
async fn test_bigquery_permission_denied_is_load_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/demo-project/datasets"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Access Denied"))
        .expect(1)
        .mount(&server)
        .await;

    let dest = BigQueryDestination::new(bigquery_config(&server)).unwrap();
    let err = dest.ensure_dataset("taxi_rides").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(err.to_string().contains("Access Denied"));
}

#[tokio::test]
async fn test_bigquery_token_rejected_is_load_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let dest = BigQueryDestination::new(bigquery_config(&server)).unwrap();
    let err = dest.ensure_dataset("taxi_rides").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[tokio::test]
async fn test_bigquery_create_or_replace_table() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("DELETE"))
        .and(path(
            "/bigquery/v2/projects/demo-project/datasets/taxi_rides/tables/rides",
        ))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/demo-project/datasets/taxi_rides/tables"))
        .and(body_string_contains("\"tableId\":\"rides\""))
        .and(body_string_contains("\"type\":\"INT64\""))
        .and(body_string_contains("\"mode\":\"REQUIRED\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rides"})))
        .expect(1)
        .mount(&server)
        .await;

    let dest = BigQueryDestination::new(bigquery_config(&server)).unwrap();
    let schema = infer_schema(&rows(json!([{"id": 1}])));
    dest.create_or_replace_table(&TableRef::new("taxi_rides", "rides"), &schema)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bigquery_insert_rows_runs_load_job() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/upload/bigquery/v2/projects/demo-project/jobs"))
        .and(query_param("uploadType", "multipart"))
        .and(header(
            "content-type",
            "multipart/related; boundary=restload_load_file_boundary",
        ))
        .and(body_string_contains("\"writeDisposition\":\"WRITE_APPEND\""))
        .and(body_string_contains("\"sourceFormat\":\"NEWLINE_DELIMITED_JSON\""))
        .and(body_string_contains("{\"id\":3}"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job("load_1", "RUNNING")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/demo-project/jobs/load_1"))
        .and(query_param("location", "US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job("load_1", "DONE")))
        .expect(1)
        .mount(&server)
        .await;

    let dest = BigQueryDestination::new(bigquery_config(&server)).unwrap();
    let rows = rows(json!([{"id": 1}, {"id": 2}, {"id": 3}]));
    let schema = infer_schema(&rows);
    let written = dest
        .insert_rows(&TableRef::new("taxi_rides", "rides__staging_1"), &schema, &rows)
        .await
        .unwrap();
    assert_eq!(written, 3);
}

#[tokio::test]
async fn test_bigquery_insert_rows_parquet() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/upload/bigquery/v2/projects/demo-project/jobs"))
        .and(|req: &Request| {
            // parquet bytes are not valid UTF-8
            let body = String::from_utf8_lossy(&req.body);
            body.contains("\"sourceFormat\":\"PARQUET\"")
                && body.contains("Content-Type: application/octet-stream\r\n\r\nPAR1")
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(job("load_2", "DONE")))
        .expect(1)
        .mount(&server)
        .await;

    let config = bigquery_config(&server).with_file_format(LoaderFileFormat::Parquet);
    let dest = BigQueryDestination::new(config).unwrap();
    let rows = rows(json!([{"id": 1}]));
    let schema = infer_schema(&rows);
    dest.insert_rows(&TableRef::new("ds", "t"), &schema, &rows)
        .await
        .unwrap();
}

fn submitted_job_ids(requests: &[Request]) -> Vec<String> {
    let job_id = regex::Regex::new(r#""jobId":"([^"]+)""#).unwrap();
    requests
        .iter()
        .filter(|r| r.url.path().starts_with("/upload/"))
        .filter_map(|r| {
            let body = String::from_utf8_lossy(&r.body).into_owned();
            job_id.captures(&body).map(|c| c[1].to_string())
        })
        .collect()
}

#[tokio::test]
async fn test_bigquery_load_job_survives_lost_insert_response() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    // accepted server side, but the response outlives the request timeout
    Mock::given(method("POST"))
        .and(path("/upload/bigquery/v2/projects/demo-project/jobs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(job("late", "RUNNING"))
                .set_delay(Duration::from_secs(1)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload/bigquery/v2/projects/demo-project/jobs"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": {"code": 409, "message": "Already Exists: Job"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/bigquery/v2/projects/demo-project/jobs/restload_t_\d+_0$"))
        .and(query_param("location", "US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job("restload_t", "DONE")))
        .expect(1)
        .mount(&server)
        .await;

    let config = bigquery_config(&server).with_request_timeout(Duration::from_millis(300));
    let dest = BigQueryDestination::new(config).unwrap();
    let rows = rows(json!([{"id": 1}]));
    let schema = infer_schema(&rows);
    let written = dest
        .insert_rows(&TableRef::new("ds", "t"), &schema, &rows)
        .await
        .unwrap();
    assert_eq!(written, 1);

    let ids = submitted_job_ids(&server.received_requests().await.unwrap());
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], ids[1]);
    assert!(ids[0].starts_with("restload_t_"));
}

#[tokio::test]
async fn test_bigquery_conflict_on_first_insert_is_load_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/upload/bigquery/v2/projects/demo-project/jobs"))
        .respond_with(ResponseTemplate::new(409).set_body_string("Already Exists: Job"))
        .expect(1)
        .mount(&server)
        .await;

    let dest = BigQueryDestination::new(bigquery_config(&server)).unwrap();
    let rows = rows(json!([{"id": 1}]));
    let schema = infer_schema(&rows);
    let err = assert_err!(
        dest.insert_rows(&TableRef::new("ds", "t"), &schema, &rows)
            .await
    );
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[tokio::test]
async fn test_bigquery_failed_load_job_is_load_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    let mut failed = job("load_3", "DONE");
    failed["status"]["errorResult"] = json!({"reason": "invalid", "message": "bad row"});

    Mock::given(method("POST"))
        .and(path("/upload/bigquery/v2/projects/demo-project/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(failed))
        .mount(&server)
        .await;

    let dest = BigQueryDestination::new(bigquery_config(&server)).unwrap();
    let rows = rows(json!([{"id": 1}]));
    let schema = infer_schema(&rows);
    let err = dest
        .insert_rows(&TableRef::new("ds", "t"), &schema, &rows)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(err.to_string().contains("bad row"));
}

#[tokio::test]
async fn test_bigquery_replace_from_staging() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/demo-project/jobs"))
        .and(body_string_contains("\"writeDisposition\":\"WRITE_TRUNCATE\""))
        .and(body_string_contains("\"tableId\":\"rides__staging_1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(job("copy_1", "DONE")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(
            "/bigquery/v2/projects/demo-project/datasets/taxi_rides/tables/rides__staging_1",
        ))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dest = BigQueryDestination::new(bigquery_config(&server)).unwrap();
    let target = TableRef::new("taxi_rides", "rides");
    dest.replace_from_staging(&target.sibling("rides__staging_1"), &target)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_bigquery_job_timeout() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/demo-project/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job("copy_2", "RUNNING")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/bigquery/v2/projects/demo-project/jobs/copy_2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job("copy_2", "RUNNING")))
        .mount(&server)
        .await;

    let config = bigquery_config(&server).with_job_timeout(Duration::from_millis(50));
    let dest = BigQueryDestination::new(config).unwrap();
    let target = TableRef::new("ds", "t");
    let err = dest
        .replace_from_staging(&target.sibling("t__staging"), &target)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(err.to_string().contains("not done"));
}
