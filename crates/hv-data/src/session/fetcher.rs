//! Single-page fetches against the record source

use std::sync::Arc;

use hv_core::{FeaturePage, PageQuery, RecordSource};
use tracing::debug;

use crate::SyncError;

/// Issues page requests and bounds how many pages a session may load
pub struct PageFetcher {
    source: Arc<dyn RecordSource>,
    page_size: u32,
    max_pages: u32,
}

impl PageFetcher {
    pub fn new(source: Arc<dyn RecordSource>, page_size: u32, max_pages: u32) -> Self {
        Self {
            source,
            page_size,
            max_pages,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn source_name(&self) -> &str {
        self.source.source_name()
    }

    /// Fetch one page; collaborator errors become [`SyncError::Network`]
    pub async fn fetch(&self, query: &PageQuery) -> Result<FeaturePage, SyncError> {
        debug!(
            source = self.source.source_name(),
            page = query.page,
            page_size = query.page_size,
            filter = %query.filter,
            "fetching page"
        );
        self.source.fetch_page(query).await.map_err(SyncError::network)
    }

    /// `min(total_pages, max_pages)`, never below one
    pub fn pages_to_load(&self, total_pages: u32) -> u32 {
        total_pages.min(self.max_pages).max(1)
    }
}
