//! Viewport-independent seed snapshot loaded before any viewport session

use std::sync::Arc;

use hv_core::{Bbox, Epoch, Filter, PageQuery, RecordStore, StoreError};
use tracing::{debug, error, info};

use crate::session::PageFetcher;

/// Result of a seed attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SeedReport {
    pub epoch: Epoch,
    pub records: usize,
    /// Bounds of the seeded records, for the initial map fit
    pub bounds: Option<Bbox>,
    pub failed: bool,
    /// A reset happened while the seed was in flight
    pub superseded: bool,
    /// The epoch was already seeded; nothing was fetched or written
    pub already_seeded: bool,
}

impl SeedReport {
    fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            records: 0,
            bounds: None,
            failed: false,
            superseded: false,
            already_seeded: false,
        }
    }
}

/// Loads a small unfiltered snapshot to give the map a first paint and a
/// bounds fit
pub struct InitialLoader {
    store: Arc<RecordStore>,
    fetcher: Arc<PageFetcher>,
    seed_count: u32,
}

impl InitialLoader {
    pub fn new(store: Arc<RecordStore>, fetcher: Arc<PageFetcher>, seed_count: u32) -> Self {
        Self {
            store,
            fetcher,
            seed_count,
        }
    }

    /// Fetch the seed for `epoch` and release the viewport gate.
    ///
    /// The seed ignores both the viewport and the active filter. A failed
    /// fetch empties the collection but still completes the seed, so
    /// viewport loading is never locked out. Runs at most once per epoch.
    pub async fn load(&self, epoch: Epoch) -> SeedReport {
        let mut report = SeedReport::new(epoch);

        if self.store.epoch() == epoch && self.store.initial_load_complete() {
            debug!(epoch = epoch.0, "epoch already seeded");
            report.already_seeded = true;
            return report;
        }

        let query = PageQuery::unbounded(Filter::all(), self.seed_count);
        let records = match self.fetcher.fetch(&query).await {
            Ok(page) => page.to_records(),
            Err(e) => {
                error!(source = self.fetcher.source_name(), error = %e, "initial load failed, starting empty");
                report.failed = true;
                Vec::new()
            }
        };

        let bounds = Bbox::enclosing(records.iter().map(|r| r.boundary.as_slice()));
        match self.store.seed(epoch, records) {
            Ok(count) => {
                report.records = count;
                report.bounds = bounds;
                info!(source = self.fetcher.source_name(), records = count, "initial load complete");
            }
            Err(StoreError::StaleEpoch { .. }) => {
                debug!(epoch = epoch.0, "seed superseded by a newer reset");
                report.superseded = true;
            }
            Err(e) => {
                // Another seed settled this epoch while ours was in flight
                debug!(error = %e, "duplicate seed ignored");
                report.already_seeded = true;
            }
        }
        report
    }
}
