//! Pagination strategy implementations

use super::types::{NextPage, PaginationState, Paginator, StopCondition};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Page Number Pagination
// ============================================================================

/// Page number pagination
///
/// Requests `?page=<n>` starting at `base_page` and adds one per page.
/// An empty page always ends the sequence; `total_path` and `maximum_page`
/// can end it earlier.
#[derive(Debug, Clone)]
pub struct PageNumberPaginator {
    /// Query parameter name for page number
    pub page_param: String,
    /// First page number (usually 0 or 1)
    pub base_page: u32,
    /// Extra stop conditions checked after the empty-page rule
    pub stop_conditions: Vec<StopCondition>,
    /// Treat a 404 after the first page as the end of the data
    pub stop_on_not_found: bool,
}

impl Default for PageNumberPaginator {
    fn default() -> Self {
        Self::new("page", 1)
    }
}

impl PageNumberPaginator {
    /// Create a new page number paginator
    pub fn new(page_param: impl Into<String>, base_page: u32) -> Self {
        Self {
            page_param: page_param.into(),
            base_page,
            stop_conditions: Vec::new(),
            stop_on_not_found: true,
        }
    }

    /// Stop once the page count found at `path` is reached
    #[must_use]
    pub fn with_total_path(mut self, path: impl Into<String>) -> Self {
        self.stop_conditions.push(StopCondition::total_pages(path));
        self
    }

    /// Never request pages above `page` (inclusive bound)
    #[must_use]
    pub fn with_maximum_page(mut self, page: u32) -> Self {
        self.stop_conditions.push(StopCondition::MaximumPage(page));
        self
    }

    /// Set 404 handling
    #[must_use]
    pub fn with_stop_on_not_found(mut self, stop: bool) -> Self {
        self.stop_on_not_found = stop;
        self
    }
}

impl Paginator for PageNumberPaginator {
    fn initial_state(&self) -> PaginationState {
        PaginationState::starting_at(self.base_page)
    }

    fn request_params(&self, state: &PaginationState) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert(self.page_param.clone(), state.page.to_string());
        params
    }

    fn process_response(
        &self,
        body: &Value,
        records: usize,
        state: &mut PaginationState,
    ) -> NextPage {
        if StopCondition::EmptyPage.is_met(body, records, state) {
            state.finish();
            return NextPage::Done;
        }

        state.record_page(records);

        if self
            .stop_conditions
            .iter()
            .any(|c| c.is_met(body, records, state))
        {
            state.finish();
            return NextPage::Done;
        }

        if !state.advance() {
            return NextPage::Done;
        }
        NextPage::Page(state.page)
    }

    fn is_end_of_data(&self, status: u16, state: &PaginationState) -> bool {
        self.stop_on_not_found && status == 404 && state.pages_fetched > 0
    }
}
