//! Page sequencing for the source API
//!
//! A paginator turns the fetcher's position into query parameters and decides,
//! from each response, whether another page should be requested.

mod strategies;
mod types;

pub use strategies::PageNumberPaginator;
pub use types::{NextPage, PaginationState, Paginator, StopCondition};
