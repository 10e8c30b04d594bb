//! Crate-wide error type
//!
//! Variants are grouped by the stage that raises them. [`Error::kind`] folds
//! them into the three classes an operator sees in a run summary:
//! configuration, fetch and load.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration
    // ============================================================================
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("{field} is required but was not set")]
    MissingConfigField { field: String },

    #[error("{field}: {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Pipeline definition is not valid YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Malformed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Source
    // ============================================================================
    #[error("Page {page} returned HTTP {status}: {body}")]
    Fetch { page: u32, status: u16, body: String },

    #[error("Page {page} could not be decoded: {message}")]
    Decode { page: u32, message: String },

    #[error("Bad records path: {message}")]
    JsonPath { message: String },

    // ============================================================================
    // Destination
    // ============================================================================
    #[error("{destination} load failed: {message}")]
    Load {
        destination: String,
        message: String,
    },

    #[error("Source fields '{first}' and '{second}' both map to column '{column}'")]
    ColumnCollision {
        column: String,
        first: String,
        second: String,
    },

    #[error("Credentials rejected: {message}")]
    Auth { message: String },

    #[error("Service account assertion failed: {message}")]
    JwtGeneration { message: String },

    #[error(transparent)]
    DuckDb(#[from] duckdb::Error),

    #[error("Staging batch could not be built: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Staging file could not be written: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    // ============================================================================
    // Transport
    // ============================================================================
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("No response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ============================================================================
    // Everything else
    // ============================================================================
    #[error(transparent)]
    JsonParse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

/// Failure class reported in run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing was fetched or written
    Config,
    /// The source API failed mid-pagination
    Fetch,
    /// The destination write failed
    Load,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Fetch => "FetchError",
            ErrorKind::Load => "LoadError",
            ErrorKind::Other => "Error",
        })
    }
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// `field` names the env var or YAML key that was absent
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Non-success status for source page `page`
    pub fn fetch(page: u32, status: u16, body: impl Into<String>) -> Self {
        Self::Fetch {
            page,
            status,
            body: body.into(),
        }
    }

    pub fn decode(page: u32, message: impl Into<String>) -> Self {
        Self::Decode {
            page,
            message: message.into(),
        }
    }

    /// `destination` is the backend name (`bigquery`, `duckdb`)
    pub fn load(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            destination: destination.into(),
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Failure class; context wrappers report the class of what they wrap
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. }
            | Error::MissingConfigField { .. }
            | Error::InvalidConfigValue { .. }
            | Error::YamlParse(_)
            | Error::InvalidUrl(_) => ErrorKind::Config,
            Error::Fetch { .. } | Error::Decode { .. } | Error::JsonPath { .. } => {
                ErrorKind::Fetch
            }
            Error::Load { .. }
            | Error::ColumnCollision { .. }
            | Error::Auth { .. }
            | Error::JwtGeneration { .. }
            | Error::DuckDb(_)
            | Error::Arrow(_)
            | Error::Parquet(_) => ErrorKind::Load,
            Error::Context { source, .. } => source.kind(),
            _ => ErrorKind::Other,
        }
    }

    /// Transient transport failure or a throttling/gateway status
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::Timeout { .. } => true,
            Error::Context { source, .. } => source.is_retryable(),
            _ => self.status().is_some_and(is_retryable_status),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } | Error::Fetch { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            Error::Context { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Throttling and transient gateway/server statuses
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502..=504 | 520..=524)
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach a description of what was being attempted
pub trait ResultExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Context {
            message: message.into(),
            source: Box::new(e.into()),
        })
    }
}
