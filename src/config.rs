//! Runtime configuration
//!
//! Credentials and destination settings are resolved once at startup into
//! plain structs and passed by reference into the loader. Nothing here reads
//! or writes process-wide state after construction.

use crate::error::{Error, Result};
use crate::types::LoaderFileFormat;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the service-account email
pub const CLIENT_EMAIL_VAR: &str = "GOOGLE_CLIENT_EMAIL";
/// Environment variable holding the PEM private key
pub const PRIVATE_KEY_VAR: &str = "GOOGLE_PRIVATE_KEY";
/// Environment variable holding the project id
pub const PROJECT_ID_VAR: &str = "GOOGLE_PROJECT_ID";

/// Default BigQuery REST endpoint
pub const BIGQUERY_API_URL: &str = "https://bigquery.googleapis.com";
/// Default Google OAuth2 token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

// ============================================================================
// Service Account Credentials
// ============================================================================

/// Google service-account credentials
#[derive(Clone)]
pub struct GcpCredentials {
    client_email: String,
    private_key: String,
    project_id: String,
}

impl GcpCredentials {
    /// Build credentials from raw values, normalizing and validating them
    pub fn new(
        client_email: impl Into<String>,
        private_key: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Result<Self> {
        let client_email = required(CLIENT_EMAIL_VAR, Some(client_email.into()))?;
        let private_key = required(PRIVATE_KEY_VAR, Some(private_key.into()))?;
        let project_id = required(PROJECT_ID_VAR, Some(project_id.into()))?;
        Self::validated(client_email, private_key, project_id)
    }

    /// Read credentials through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_email = required(CLIENT_EMAIL_VAR, lookup(CLIENT_EMAIL_VAR))?;
        let private_key = required(PRIVATE_KEY_VAR, lookup(PRIVATE_KEY_VAR))?;
        let project_id = required(PROJECT_ID_VAR, lookup(PROJECT_ID_VAR))?;
        Self::validated(client_email, private_key, project_id)
    }

    fn validated(client_email: String, private_key: String, project_id: String) -> Result<Self> {
        if !client_email.contains('@') {
            return Err(Error::invalid_value(
                CLIENT_EMAIL_VAR,
                "expected a service account email address",
            ));
        }

        let private_key = normalize_private_key(&private_key);
        validate_private_key(&private_key)?;

        Ok(Self {
            client_email: client_email.trim().to_string(),
            private_key,
            project_id: project_id.trim().to_string(),
        })
    }

    /// Service-account email (JWT issuer)
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// PEM-encoded private key with real newlines
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Project that owns the datasets
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl fmt::Debug for GcpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpCredentials")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::missing_field(field)),
    }
}

/// Turn literal `\n` escape sequences into real newlines
pub fn normalize_private_key(raw: &str) -> String {
    let key = raw.trim().trim_matches('"').replace("\\n", "\n");
    let mut key = key.trim().to_string();
    key.push('\n');
    key
}

fn validate_private_key(pem: &str) -> Result<()> {
    if !pem.contains("-----BEGIN") || !pem.contains("PRIVATE KEY-----") {
        return Err(Error::invalid_value(
            PRIVATE_KEY_VAR,
            "expected a PEM encoded private key",
        ));
    }

    jsonwebtoken::EncodingKey::from_rsa_pem(pem.as_bytes())
        .map(|_| ())
        .map_err(|e| Error::invalid_value(PRIVATE_KEY_VAR, format!("unusable RSA key: {e}")))
}

// ============================================================================
// Destination Configuration
// ============================================================================

/// Where a pipeline run writes its table
#[derive(Debug, Clone)]
pub enum DestinationConfig {
    /// DuckDB database file; `None` keeps the database in memory
    DuckDb { path: Option<PathBuf> },
    /// BigQuery project reached through the REST API
    BigQuery(BigQueryConfig),
}

impl DestinationConfig {
    /// DuckDB database at `path`
    pub fn duckdb(path: impl Into<PathBuf>) -> Self {
        Self::DuckDb {
            path: Some(path.into()),
        }
    }

    /// In-memory DuckDB database
    pub fn duckdb_in_memory() -> Self {
        Self::DuckDb { path: None }
    }

    /// BigQuery with default endpoints
    pub fn bigquery(credentials: GcpCredentials) -> Self {
        Self::BigQuery(BigQueryConfig::new(credentials))
    }
}

/// BigQuery connection settings
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    /// Service-account credentials
    pub credentials: GcpCredentials,
    /// Dataset location (e.g. "US", "EU")
    pub location: String,
    /// REST API root
    pub api_url: String,
    /// OAuth2 token endpoint (also the JWT audience)
    pub token_url: String,
    /// Delay between job status polls
    pub poll_interval: Duration,
    /// Give up waiting on a job after this long
    pub job_timeout: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Load file encoding
    pub file_format: LoaderFileFormat,
}

impl BigQueryConfig {
    /// Create a config with Google's public endpoints
    pub fn new(credentials: GcpCredentials) -> Self {
        Self {
            credentials,
            location: "US".to_string(),
            api_url: BIGQUERY_API_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(600),
            request_timeout: Duration::from_secs(60),
            file_format: LoaderFileFormat::default(),
        }
    }

    /// Set dataset location
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Override the API root (used against mock servers)
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the token endpoint
    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Set job polling cadence
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set load file encoding
    #[must_use]
    pub fn with_file_format(mut self, format: LoaderFileFormat) -> Self {
        self.file_format = format;
        self
    }

    /// Set job wait limit
    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
