//! HTTP plumbing shared by the source fetcher and the BigQuery destination
//!
//! [`HttpClient`] resolves paths against a base URL and paces requests through
//! an optional [`RateLimiter`]. It injects credentials from an
//! [`Authenticator`](crate::auth::Authenticator). Retries are opt-in per client or per
//! request: throttling and gateway statuses back off (honouring `Retry-After`),
//! everything else fails on the first response.

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, RequestBody, RequestConfig, RetryPolicy};
pub use rate_limit::{RateLimiter, RateLimiterConfig};

#[cfg(test)]
mod tests;
