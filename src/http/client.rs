//! Request execution for the source API and the BigQuery REST endpoints
//!
//! Every call goes through [`HttpClient::request`]: pace, authenticate, send,
//! then either return the response or classify the failure. 4xx/5xx statuses
//! surface as [`Error::HttpStatus`] carrying the response body.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::auth::{Authenticator, ServiceAccountAuth};
use crate::error::{is_retryable_status, Error, Result};
use crate::types::BackoffType;
use bytes::Bytes;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Retry Policy
// ============================================================================

/// How many times a failed attempt is repeated, and how long to wait between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub backoff: BackoffType,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff from 100ms, capped at one minute
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: BackoffType::Exponential,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffType, initial: Duration, max: Duration) -> Self {
        self.backoff = backoff;
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    /// Wait before retry number `attempt` (zero based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            BackoffType::Constant => self.initial_delay,
            BackoffType::Linear => self.initial_delay.saturating_mul(attempt.saturating_add(1)),
            BackoffType::Exponential => self
                .initial_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
        };
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

// ============================================================================
// Client Configuration
// ============================================================================

/// Settings shared by every request a client makes
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Prefix for relative paths
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limit: Option<RateLimiterConfig>,
    /// Sent with every request; per-request headers win on conflict
    pub default_headers: BTreeMap<String, String>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rate_limit: None,
            default_headers: BTreeMap::new(),
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
        }
    }
}

impl HttpClientConfig {
    /// Client rooted at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimiterConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

// ============================================================================
// Per-request Options
// ============================================================================

/// Request payload
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Serialized as `application/json`
    Json(Value),
    /// Sent as-is under `content_type`
    Bytes { content_type: String, data: Bytes },
}

/// Options for one call
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Sent in key order
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
    /// Overrides the client timeout
    pub timeout: Option<Duration>,
    /// Overrides the client's retry count
    pub max_retries: Option<u32>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    #[must_use]
    pub fn bytes(mut self, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes {
            content_type: content_type.into(),
            data: data.into(),
        });
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

// ============================================================================
// Client
// ============================================================================

/// Paced, optionally authenticated HTTP client
pub struct HttpClient {
    inner: Client,
    config: HttpClientConfig,
    authenticator: Option<Authenticator>,
    pacer: Option<RateLimiter>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let inner = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        let pacer = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            inner,
            config,
            authenticator: None,
            pacer,
        })
    }

    /// Authenticate every request; token exchanges share this client's pool
    #[must_use]
    pub fn with_auth(mut self, account: ServiceAccountAuth) -> Self {
        self.authenticator = Some(Authenticator::new(account, self.inner.clone()));
        self
    }

    pub async fn get(&self, url: &str, config: RequestConfig) -> Result<Response> {
        self.request(Method::GET, url, config).await
    }

    pub async fn post_json(&self, url: &str, body: Value) -> Result<Response> {
        self.request(Method::POST, url, RequestConfig::new().json(body))
            .await
    }

    pub async fn delete(&self, url: &str) -> Result<Response> {
        self.request(Method::DELETE, url, RequestConfig::new()).await
    }

    /// Make a request, retrying transient failures up to the configured limit
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
    ) -> Result<Response> {
        let full_url = self.build_url(url);
        let max_retries = config.max_retries.unwrap_or(self.config.retry.max_retries);
        let timeout = config.timeout.unwrap_or(self.config.timeout);

        let mut attempt = 0;
        loop {
            let outcome = self.send_once(&method, &full_url, &config, timeout).await?;
            let delay = if attempt < max_retries {
                self.retry_delay(&outcome, attempt)
            } else {
                None
            };

            match (outcome, delay) {
                (Attempt::Success(response), _) => {
                    debug!("{} {} -> {}", method, full_url, response.status().as_u16());
                    return Ok(response);
                }
                (outcome, Some(delay)) => {
                    warn!(
                        "{} {} failed ({}), attempt {}/{}, retrying in {:?}",
                        method,
                        full_url,
                        outcome,
                        attempt + 1,
                        max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                (outcome, None) => {
                    debug!("{} {} failed ({})", method, full_url, outcome);
                    return Err(outcome.into_error(timeout));
                }
            }
        }
    }

    /// One attempt: rate limit, build, authenticate, send
    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        config: &RequestConfig,
        timeout: Duration,
    ) -> Result<Attempt> {
        if let Some(pacer) = &self.pacer {
            pacer.wait().await;
        }

        let mut req = self.inner.request(method.clone(), url).timeout(timeout);
        for (key, value) in self.config.default_headers.iter().chain(&config.headers) {
            req = req.header(key.as_str(), value.as_str());
        }
        if !config.query.is_empty() {
            req = req.query(&config.query);
        }
        req = match &config.body {
            Some(RequestBody::Json(body)) => req.json(body),
            Some(RequestBody::Bytes { content_type, data }) => req
                .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
            None => req,
        };
        if let Some(auth) = &self.authenticator {
            req = auth.apply(req).await?;
        }

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::Failed(e)),
        };

        let status = response.status();
        if !status.is_client_error() && !status.is_server_error() {
            return Ok(Attempt::Success(response));
        }

        let retry_after = extract_retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        Ok(Attempt::Status {
            status,
            retry_after,
            body,
        })
    }

    /// Delay before retrying `outcome`, or `None` when it is final
    fn retry_delay(&self, outcome: &Attempt, attempt: u32) -> Option<Duration> {
        match outcome {
            Attempt::Success(_) => None,
            Attempt::Status {
                status,
                retry_after,
                ..
            } if is_retryable_status(status.as_u16()) => {
                Some(retry_after.unwrap_or_else(|| self.config.retry.delay(attempt)))
            }
            Attempt::Status { .. } => None,
            Attempt::Failed(e) if e.is_timeout() || e.is_connect() => {
                Some(self.config.retry.delay(attempt))
            }
            Attempt::Failed(_) => None,
        }
    }

    /// Send and decode a JSON response body
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
    ) -> Result<T> {
        Ok(self.request(method, url, config).await?.json().await?)
    }

    /// Resolve `path` against the base URL; absolute URLs pass through
    pub fn build_url(&self, path: &str) -> String {
        let absolute = path.starts_with("http://") || path.starts_with("https://");
        match self.config.base_url.as_deref() {
            Some(base) if !absolute => {
                let (base, path) = (base.trim_end_matches('/'), path.trim_start_matches('/'));
                if path.is_empty() {
                    base.to_string()
                } else {
                    format!("{base}/{path}")
                }
            }
            _ => path.to_string(),
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("authenticator", &self.authenticator)
            .field("pacer", &self.pacer)
            .finish_non_exhaustive()
    }
}

/// Result of a single send
enum Attempt {
    /// Any non-error status
    Success(Response),
    /// 4xx or 5xx, body already read
    Status {
        status: StatusCode,
        retry_after: Option<Duration>,
        body: String,
    },
    /// Transport failure (connect, timeout, ...)
    Failed(reqwest::Error),
}

impl Attempt {
    fn into_error(self, timeout: Duration) -> Error {
        match self {
            Attempt::Success(response) => {
                Error::http_status(response.status().as_u16(), "unexpected success")
            }
            Attempt::Status { status, body, .. } => Error::http_status(status.as_u16(), body),
            Attempt::Failed(e) if e.is_timeout() => Error::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
            Attempt::Failed(e) => Error::Http(e),
        }
    }
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attempt::Success(response) => write!(f, "{}", response.status().as_u16()),
            Attempt::Status { status, .. } => write!(f, "{}", status.as_u16()),
            Attempt::Failed(e) if e.is_timeout() => write!(f, "timeout"),
            Attempt::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Extract retry-after header value
fn extract_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
