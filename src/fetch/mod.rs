//! Paginated fetcher
//!
//! Walks a page-number paginated resource and yields one [`Page`] per
//! non-empty response.
//!
//! # Overview
//!
//! - `PageFetcher` - validated source configuration plus an HTTP client
//! - `PageStream` - consume-once, pull-based page sequence
//!
//! Pages are requested strictly one after another; page N+1 is only
//! requested once page N has been handed to the caller.

mod types;

pub use types::{FetcherConfig, Page};

use crate::decode::{JsonDecoder, RecordDecoder};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RateLimiterConfig, RequestConfig, RetryPolicy};
use crate::pagination::{NextPage, PaginationState, Paginator};
use futures::Stream;
use tracing::{debug, info};

/// Fetches every page of a source resource
#[derive(Debug)]
pub struct PageFetcher {
    client: HttpClient,
    config: FetcherConfig,
}

impl PageFetcher {
    /// Build a fetcher, validating the source URL
    pub fn new(config: FetcherConfig) -> Result<Self> {
        config.validate()?;

        let mut http = HttpClientConfig::new(config.base_url.clone())
            .with_timeout(config.timeout)
            .with_retry(RetryPolicy::new(config.max_retries));
        if let Some(rps) = config.rate_limit_rps {
            http = http.with_rate_limit(RateLimiterConfig::per_second(rps));
        }

        let client = HttpClient::new(http)?;
        Ok(Self { client, config })
    }

    /// Source configuration
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Start the page sequence; the fetcher is consumed so a sequence
    /// cannot be restarted
    pub fn fetch_all(self) -> PageStream {
        let paginator: Box<dyn Paginator> = Box::new(self.config.paginator.clone());
        let state = paginator.initial_state();
        let url = self.client.build_url(&self.config.path);
        let decoder = JsonDecoder::from_path(self.config.records_path.as_deref());

        info!("Fetching {url} from page {}", state.page);

        PageStream {
            client: self.client,
            url,
            decoder,
            paginator,
            state,
            max_pages: self.config.max_pages,
        }
    }
}

/// Lazy, consume-once sequence of pages
pub struct PageStream {
    client: HttpClient,
    url: String,
    decoder: JsonDecoder,
    paginator: Box<dyn Paginator>,
    state: PaginationState,
    max_pages: Option<u32>,
}

impl PageStream {
    /// Fetch the next non-empty page; `Ok(None)` once the data is exhausted.
    /// After `None` or an error the stream stays exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.state.done {
            return Ok(None);
        }

        if self
            .max_pages
            .is_some_and(|max| self.state.pages_fetched >= max)
        {
            debug!("Page limit reached after {} pages", self.state.pages_fetched);
            self.state.finish();
            return Ok(None);
        }

        let number = self.state.page;
        match self.fetch_page(number).await {
            Ok(page) => Ok(page),
            Err(e) => {
                self.state.finish();
                Err(e)
            }
        }
    }

    async fn fetch_page(&mut self, number: u32) -> Result<Option<Page>> {
        let mut request = RequestConfig::new();
        for (key, value) in self.paginator.request_params(&self.state) {
            request = request.query(key, value);
        }

        let response = match self.client.get(&self.url, request).await {
            Ok(response) => response,
            Err(Error::HttpStatus { status, body }) => {
                if self.paginator.is_end_of_data(status, &self.state) {
                    debug!("Page {number} returned {status}, treating as end of data");
                    self.state.finish();
                    return Ok(None);
                }
                return Err(Error::fetch(number, status, body));
            }
            Err(e) => return Err(e),
        };

        let body = response.text().await?;
        let value = self
            .decoder
            .decode_raw(&body)
            .map_err(|e| Error::decode(number, e.to_string()))?;
        let records = self
            .decoder
            .extract_records(&value)
            .map_err(|e| Error::decode(number, e.to_string()))?;

        debug!("Page {number}: {} records", records.len());

        let next = self
            .paginator
            .process_response(&value, records.len(), &mut self.state);
        match next {
            NextPage::Page(following) => debug!("Page {number} done, next is {following}"),
            NextPage::Done => debug!("Pagination finished at page {number}"),
        }

        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(Page { number, records }))
    }

    /// Pages served so far
    pub fn pages_fetched(&self) -> u32 {
        self.state.pages_fetched
    }

    /// Records served so far
    pub fn records_fetched(&self) -> u64 {
        self.state.records_fetched
    }

    /// Whether the sequence has ended
    pub fn is_exhausted(&self) -> bool {
        self.state.done
    }

    /// Adapt into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<Page>> {
        futures::stream::try_unfold(self, |mut pages| async move {
            Ok(pages.next_page().await?.map(|page| (page, pages)))
        })
    }
}

impl std::fmt::Debug for PageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStream")
            .field("url", &self.url)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
