//! Tests for the HTTP client module

use super::*;
use crate::auth::{ServiceAccountAuth, BIGQUERY_SCOPE};
use crate::config::GcpCredentials;
use crate::error::Error;
use crate::types::BackoffType;
use reqwest::Method;
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpClient {
    HttpClient::new(HttpClientConfig::new(server.uri())).unwrap()
}

fn service_account(token_url: String) -> ServiceAccountAuth {
    let key = include_str!("../../tests/fixtures/service_account_key.pem");
    let creds = GcpCredentials::new("loader@demo.iam", key, "demo").unwrap();
    ServiceAccountAuth::new(&creds, token_url, BIGQUERY_SCOPE)
}

async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": token,
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

fn fast_retries(server: &MockServer, retries: u32) -> HttpClient {
    let retry = RetryPolicy::new(retries).with_backoff(
        BackoffType::Constant,
        Duration::from_millis(10),
        Duration::from_secs(1),
    );
    HttpClient::new(HttpClientConfig::new(server.uri()).with_retry(retry)).unwrap()
}

fn policy(backoff: BackoffType, initial_ms: u64, max_ms: u64) -> RetryPolicy {
    RetryPolicy::new(3).with_backoff(
        backoff,
        Duration::from_millis(initial_ms),
        Duration::from_millis(max_ms),
    )
}

#[test]
fn test_http_client_config_default() {
    let config = HttpClientConfig::default();
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(config.retry, RetryPolicy::new(3));
    assert!(config.base_url.is_none());
    assert!(config.rate_limit.is_none());
    assert!(config.user_agent.starts_with("restload/"));
}

#[test]
fn test_http_client_config_with_methods() {
    let config = HttpClientConfig::new("https://api.example.com")
        .with_timeout(Duration::from_secs(60))
        .with_retry(RetryPolicy::new(0))
        .with_rate_limit(RateLimiterConfig::per_second(5))
        .with_header("X-Custom", "value")
        .with_user_agent("test-agent/1.0");

    assert_eq!(config.base_url.as_deref(), Some("https://api.example.com"));
    assert_eq!(config.timeout, Duration::from_secs(60));
    assert_eq!(config.retry.max_retries, 0);
    assert_eq!(config.rate_limit, Some(RateLimiterConfig::new(5, 5)));
    assert_eq!(
        config.default_headers.get("X-Custom").map(String::as_str),
        Some("value")
    );
    assert_eq!(config.user_agent, "test-agent/1.0");
}

#[test]
fn test_request_config_builder() {
    let config = RequestConfig::new()
        .query("page", "1")
        .header("X-Request-Id", "abc123")
        .json(serde_json::json!({"key": "value"}))
        .timeout(Duration::from_secs(10))
        .retries(2);

    assert_eq!(config.query.get("page").map(String::as_str), Some("1"));
    assert_eq!(
        config.headers.get("X-Request-Id").map(String::as_str),
        Some("abc123")
    );
    assert!(matches!(config.body, Some(RequestBody::Json(_))));
    assert_eq!(config.timeout, Some(Duration::from_secs(10)));
    assert_eq!(config.max_retries, Some(2));
}

#[tokio::test]
async fn test_http_client_request_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": 42
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let data: serde_json::Value = client
        .request_json(Method::GET, "/api/data", RequestConfig::new())
        .await
        .unwrap();

    assert_eq!(data["value"], 42);
}

#[tokio::test]
async fn test_http_client_post_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let response = client
        .post_json("/api/items", serde_json::json!({"name": "test"}))
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn test_http_client_raw_bytes_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header("content-type", "multipart/related; boundary=xyz"))
        .and(body_string("--xyz\r\npayload\r\n--xyz--"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let response = client
        .request(
            Method::POST,
            "/upload",
            RequestConfig::new().bytes(
                "multipart/related; boundary=xyz",
                "--xyz\r\npayload\r\n--xyz--".as_bytes().to_vec(),
            ),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_http_client_delete() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/tables/rides"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let response = client.delete("/tables/rides").await.unwrap();
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn test_http_client_query_params() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/search"))
        .and(query_param("q", "test"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let response = client
        .get(
            "/api/search",
            RequestConfig::new().query("q", "test").query("page", "2"),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_http_client_default_and_request_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/data"))
        .and(header("X-Default", "d"))
        .and(header("X-Request-Id", "req-456"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::new(mock_server.uri()).with_header("X-Default", "d");

    let client = HttpClient::new(config).unwrap();
    let response = client
        .get(
            "/api/data",
            RequestConfig::new().header("X-Request-Id", "req-456"),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_http_client_service_account_auth() {
    let mock_server = MockServer::start().await;
    mount_token(&mock_server, "t0ken").await;

    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("authorization", "Bearer t0ken"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client =
        client_for(&mock_server).with_auth(service_account(format!("{}/token", mock_server.uri())));

    client.get("/secure", RequestConfig::new()).await.unwrap();
}

#[tokio::test]
async fn test_http_client_404_error_keeps_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.get("/api/missing", RequestConfig::new()).await.unwrap_err();

    match err {
        Error::HttpStatus { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "Not found");
        }
        other => panic!("Expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn test_http_client_retry_on_500() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let client = fast_retries(&mock_server, 3);
    let response = client.get("/api/flaky", RequestConfig::new()).await.unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_http_client_zero_retries_fails_on_first_500() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/once"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_retries(&mock_server, 0);
    let err = client.get("/api/once", RequestConfig::new()).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn test_http_client_rate_limit_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/limited"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0")
                .set_body_string("Rate limited"),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/limited"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = fast_retries(&mock_server, 2);
    let response = client.get("/api/limited", RequestConfig::new()).await.unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_http_client_max_retries_exceeded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/always-fail"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Server error"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = fast_retries(&mock_server, 2);
    let err = client.get("/api/always-fail", RequestConfig::new()).await.unwrap_err();

    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_http_client_client_errors_are_final() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_retries(&mock_server, 3);
    let err = client.get("/api/missing", RequestConfig::new()).await.unwrap_err();

    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_http_client_slow_response_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let config = RequestConfig::new()
        .timeout(Duration::from_millis(50))
        .retries(0);
    let err = client
        .request(Method::GET, "/api/slow", config)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { timeout_ms: 50 }));
}

#[tokio::test]
async fn test_http_client_full_url_bypasses_base() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/test"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = HttpClient::new(HttpClientConfig::default()).unwrap();
    let response = client
        .get(&format!("{}/api/test", mock_server.uri()), RequestConfig::new())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[test]
fn test_build_url() {
    let client = HttpClient::new(HttpClientConfig::new("https://api.example.com/")).unwrap();

    assert_eq!(
        client.build_url("/rides"),
        "https://api.example.com/rides"
    );
    assert_eq!(client.build_url(""), "https://api.example.com");
    assert_eq!(
        client.build_url("http://other.example/x"),
        "http://other.example/x"
    );
}

#[test]
fn test_constant_delay() {
    let retry = policy(BackoffType::Constant, 100, 10_000);
    assert_eq!(retry.delay(0), Duration::from_millis(100));
    assert_eq!(retry.delay(5), Duration::from_millis(100));
}

#[test]
fn test_linear_delay() {
    let retry = policy(BackoffType::Linear, 100, 10_000);
    assert_eq!(retry.delay(0), Duration::from_millis(100));
    assert_eq!(retry.delay(2), Duration::from_millis(300));
}

#[test]
fn test_exponential_delay_is_capped() {
    let retry = policy(BackoffType::Exponential, 100, 500);
    assert_eq!(retry.delay(1), Duration::from_millis(200));
    assert_eq!(retry.delay(2), Duration::from_millis(400));
    assert_eq!(retry.delay(10), Duration::from_millis(500));
    assert_eq!(retry.delay(40), Duration::from_millis(500));
}

#[tokio::test]
async fn test_http_client_with_rate_limiter() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config =
        HttpClientConfig::new(mock_server.uri()).with_rate_limit(RateLimiterConfig::new(100, 10));
    let client = HttpClient::new(config).unwrap();

    for _ in 0..3 {
        client.get("/api/data", RequestConfig::new()).await.unwrap();
    }
}

#[tokio::test]
async fn test_http_client_debug() {
    let server = MockServer::start().await;
    let client = client_for(&server).with_auth(service_account(format!("{}/token", server.uri())));
    let debug_str = format!("{client:?}");
    assert!(debug_str.contains("HttpClient"));
    assert!(debug_str.contains("loader@demo.iam"));
    assert!(!debug_str.contains("PRIVATE KEY"));
}
