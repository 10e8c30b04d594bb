//! Paginator contract and the cursor it advances

use crate::decode::extract_path_u64;
use serde_json::Value;
use std::collections::BTreeMap;

/// What follows the page just processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPage {
    /// Request this page number next
    Page(u32),
    Done,
}

impl NextPage {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Ways a page sequence ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopCondition {
    /// The page carried no records
    EmptyPage,

    /// The response reports how many pages exist
    TotalPages {
        /// Dot path to the page count
        path: String,
    },

    /// Last page number to request (inclusive)
    MaximumPage(u32),
}

impl StopCondition {
    pub fn total_pages(path: impl Into<String>) -> Self {
        Self::TotalPages { path: path.into() }
    }

    /// Whether the page at `state.page` is the last one to request.
    /// A missing page count never stops the sequence.
    pub fn is_met(&self, body: &Value, records: usize, state: &PaginationState) -> bool {
        match self {
            StopCondition::EmptyPage => records == 0,
            StopCondition::TotalPages { path } => extract_path_u64(body, path).is_some_and(|total| {
                // pages base..base+total-1 exist
                u64::from(state.page) + 1 >= total + u64::from(state.base_page)
            }),
            StopCondition::MaximumPage(max) => state.page >= *max,
        }
    }
}

/// Cursor over a page-numbered sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Page number of the next (or in-flight) request
    pub page: u32,
    /// First page number of the sequence
    pub base_page: u32,
    /// Pages that returned at least one record
    pub pages_fetched: u32,
    pub records_fetched: u64,
    /// No further requests will be made
    pub done: bool,
}

impl PaginationState {
    pub fn starting_at(page: u32) -> Self {
        Self {
            page,
            base_page: page,
            ..Default::default()
        }
    }

    pub fn finish(&mut self) {
        self.done = true;
    }

    /// Move to the next page number. Past `u32::MAX` there is none, so the
    /// sequence finishes and this returns false.
    pub fn advance(&mut self) -> bool {
        match self.page.checked_add(1) {
            Some(next) => {
                self.page = next;
                true
            }
            None => {
                self.finish();
                false
            }
        }
    }

    /// Count a page that returned `records` rows
    pub fn record_page(&mut self, records: usize) {
        self.pages_fetched += 1;
        self.records_fetched += records as u64;
    }
}

/// Strategy that maps a cursor to request parameters and decides when to stop
pub trait Paginator: Send + Sync {
    /// Cursor for a fresh sequence
    fn initial_state(&self) -> PaginationState;

    /// Query parameters for the request at `state`
    fn request_params(&self, state: &PaginationState) -> BTreeMap<String, String>;

    /// Update `state` from a decoded page and say what comes next
    fn process_response(
        &self,
        body: &Value,
        records: usize,
        state: &mut PaginationState,
    ) -> NextPage;

    /// Whether `status` at `state` means the data ran out rather than a failure
    fn is_end_of_data(&self, _status: u16, _state: &PaginationState) -> bool {
        false
    }
}
