//! Fetcher types

use crate::error::{Error, Result};
use crate::pagination::PageNumberPaginator;
use crate::types::JsonObject;
use std::time::Duration;

/// Configuration for a paginated source resource
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// API root, e.g. `https://api.example.com`
    pub base_url: String,
    /// Resource path relative to `base_url`
    pub path: String,
    /// Optional path to the record list inside each response
    pub records_path: Option<String>,
    /// Page cursor strategy
    pub paginator: PageNumberPaginator,
    /// Per-request timeout
    pub timeout: Duration,
    /// Client-level retries for each page request
    pub max_retries: u32,
    /// Optional requests-per-second ceiling
    pub rate_limit_rps: Option<u32>,
    /// Stop after this many non-empty pages
    pub max_pages: Option<u32>,
}

impl FetcherConfig {
    /// Create a config with page-number pagination starting at page 1
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            records_path: None,
            paginator: PageNumberPaginator::default(),
            timeout: Duration::from_secs(30),
            max_retries: 0,
            rate_limit_rps: None,
            max_pages: None,
        }
    }

    /// Set the paginator
    #[must_use]
    pub fn with_paginator(mut self, paginator: PageNumberPaginator) -> Self {
        self.paginator = paginator;
        self
    }

    /// Set the record path
    #[must_use]
    pub fn with_records_path(mut self, path: impl Into<String>) -> Self {
        self.records_path = Some(path.into());
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set client-level retries
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Throttle requests
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.rate_limit_rps = Some(requests_per_second);
        self
    }

    /// Cap the number of pages
    #[must_use]
    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = Some(pages);
        self
    }

    /// Check that the base URL is an absolute http(s) URL
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_value(
                "source.base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if self.path.trim().is_empty() {
            return Err(Error::invalid_value("source.path", "cannot be empty"));
        }
        if self.max_pages == Some(0) {
            return Err(Error::invalid_value("max_pages", "must be at least 1"));
        }
        Ok(())
    }
}

/// One non-empty page of source records
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Page number that produced these records
    pub number: u32,
    /// Records in response order
    pub records: Vec<JsonObject>,
}

impl Page {
    /// Number of records on the page
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the page carries no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
