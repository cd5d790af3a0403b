//! One coherent paged load for a viewport

mod fetcher;

pub use fetcher::PageFetcher;

use std::sync::Arc;

use hv_core::{Bbox, Epoch, Filter, PageQuery, RecordStore, StoreError, ViewportState};
use tracing::{debug, error, info};

use crate::SyncError;

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Every planned page merged and the bbox is now cached
    Completed,
    /// A page failed; earlier pages stay merged and the bbox stays uncached
    Failed(SyncError),
    /// The store was reset under the session; its remaining writes were dropped
    Superseded,
}

/// Summary of a finished session
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: u64,
    pub bbox: Bbox,
    pub pages_planned: u32,
    pub pages_loaded: u32,
    pub records_merged: usize,
    pub outcome: SessionOutcome,
}

impl SessionReport {
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Completed)
    }
}

/// Loads pages for one viewport strictly in order, merging and publishing
/// after each one.
pub struct LoadSession {
    id: u64,
    epoch: Epoch,
    filter: Filter,
    viewport: ViewportState,
    store: Arc<RecordStore>,
    fetcher: Arc<PageFetcher>,
}

impl LoadSession {
    pub fn new(
        id: u64,
        epoch: Epoch,
        filter: Filter,
        viewport: ViewportState,
        store: Arc<RecordStore>,
        fetcher: Arc<PageFetcher>,
    ) -> Self {
        Self {
            id,
            epoch,
            filter,
            viewport,
            store,
            fetcher,
        }
    }

    /// Run the session to completion.
    ///
    /// Page 1 clears the loading indicator as soon as it is merged. Pages
    /// `2..=min(total_pages, max_pages)` follow sequentially; the first
    /// failure stops the session without rolling back what was merged.
    pub async fn run(self) -> SessionReport {
        let bbox = self.viewport.bbox;
        let mut report = SessionReport {
            session_id: self.id,
            bbox,
            pages_planned: 1,
            pages_loaded: 0,
            records_merged: 0,
            outcome: SessionOutcome::Completed,
        };

        if let Err(e) = self.store.begin_loading(self.epoch) {
            report.outcome = self.interrupted(e);
            return report;
        }

        let query = PageQuery::for_viewport(
            self.filter.clone(),
            bbox,
            self.viewport.zoom,
            self.fetcher.page_size(),
        );

        // First page: publish before anything else is requested
        let first = match self.fetcher.fetch(&query).await {
            Ok(page) => page,
            Err(_) if self.is_stale() => {
                debug!(session = self.id, "first page failed after a reset, dropping session");
                report.outcome = SessionOutcome::Superseded;
                return report;
            }
            Err(e) => {
                error!(session = self.id, bbox = %bbox, error = %e, "first page failed");
                self.settle();
                report.outcome = SessionOutcome::Failed(e);
                return report;
            }
        };

        match self.store.merge(self.epoch, first.to_records()) {
            Ok(merged) => {
                report.pages_loaded = 1;
                report.records_merged = merged;
            }
            Err(e) => {
                report.outcome = self.interrupted(e);
                return report;
            }
        }
        self.settle();

        report.pages_planned = self.fetcher.pages_to_load(first.total_pages());
        debug!(
            session = self.id,
            bbox = %bbox,
            total_pages = first.total_pages(),
            pages_planned = report.pages_planned,
            "first page merged"
        );

        for page_number in 2..=report.pages_planned {
            let page = match self.fetcher.fetch(&query.with_page(page_number)).await {
                Ok(page) => page,
                Err(_) if self.is_stale() => {
                    report.outcome = SessionOutcome::Superseded;
                    return report;
                }
                Err(e) => {
                    error!(
                        session = self.id,
                        bbox = %bbox,
                        page = page_number,
                        error = %e,
                        "page failed, keeping {} merged records",
                        report.records_merged
                    );
                    report.outcome = SessionOutcome::Failed(SyncError::PartialPage {
                        page: page_number,
                        merged: report.records_merged,
                        message: e.to_string(),
                    });
                    return report;
                }
            };

            match self.store.merge(self.epoch, page.to_records()) {
                Ok(merged) => {
                    report.pages_loaded += 1;
                    report.records_merged += merged;
                }
                Err(e) => {
                    report.outcome = self.interrupted(e);
                    return report;
                }
            }
        }

        if let Err(e) = self.store.mark_loaded(self.epoch, &bbox) {
            report.outcome = self.interrupted(e);
            return report;
        }

        info!(
            session = self.id,
            bbox = %bbox,
            pages = report.pages_loaded,
            records = report.records_merged,
            "viewport fully loaded"
        );
        report
    }

    fn is_stale(&self) -> bool {
        self.store.epoch() != self.epoch
    }

    /// Clear the loading indicator; a reset store has already moved on
    fn settle(&self) {
        if let Err(e) = self.store.settle_loading(self.epoch) {
            debug!(session = self.id, error = %e, "loading indicator left to the newer epoch");
        }
    }

    fn interrupted(&self, error: StoreError) -> SessionOutcome {
        match error {
            StoreError::StaleEpoch { .. } => {
                debug!(session = self.id, "store reset under session, dropping its writes");
                SessionOutcome::Superseded
            }
            other => SessionOutcome::Failed(other.into()),
        }
    }
}
