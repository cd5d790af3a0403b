//! Orchestration: viewport events in, merged records out

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hv_core::events::events::{FilterChanged, SeedLoaded, SessionCompleted, SessionFailed};
use hv_core::events::EventBus;
use hv_core::{
    Bbox, Epoch, Filter, RecordSource, RecordStore, StatsSource, SummaryStats, ViewportState,
    ViewportSubscriber,
};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::debounce::Debouncer;
use crate::initial::{InitialLoader, SeedReport};
use crate::session::{LoadSession, PageFetcher, SessionOutcome, SessionReport};
use crate::significance::SignificanceFilter;
use crate::stats::StatsLoader;
use crate::SyncError;

/// Why a viewport change did not start a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The seed snapshot has not settled yet
    AwaitingSeed,
    /// This exact bbox is already fully loaded under the active filter
    Cached,
    /// The bbox did not move far enough from the last served one
    Insignificant,
    /// A reset happened before the session could start
    Superseded,
}

/// Result of a viewport run
#[derive(Debug)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Ran(SessionReport),
}

impl RunOutcome {
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            RunOutcome::Skipped(reason) => Some(*reason),
            RunOutcome::Ran(_) => None,
        }
    }

    pub fn report(&self) -> Option<&SessionReport> {
        match self {
            RunOutcome::Ran(report) => Some(report),
            RunOutcome::Skipped(_) => None,
        }
    }
}

/// The sync engine: owns the store and decides which viewport changes load
pub struct SyncEngine {
    config: SyncConfig,
    store: Arc<RecordStore>,
    fetcher: Arc<PageFetcher>,
    initial: InitialLoader,
    significance: SignificanceFilter,
    stats: Option<StatsLoader>,
    events: Arc<EventBus>,
    filter: RwLock<Filter>,
    /// Last bbox a session was started for
    last_bbox: Mutex<Option<Bbox>>,
    /// Last viewport reported, served or not
    last_viewport: Mutex<Option<ViewportState>>,
    next_session: AtomicU64,
}

impl SyncEngine {
    /// Create an engine over a record source; nothing is fetched until [`initial_load`](Self::initial_load)
    pub fn new(source: Arc<dyn RecordSource>, config: SyncConfig) -> Self {
        let store = Arc::new(RecordStore::new());
        let fetcher = Arc::new(PageFetcher::new(source, config.page_size, config.max_pages));
        let initial = InitialLoader::new(store.clone(), fetcher.clone(), config.seed_count);

        Self {
            significance: SignificanceFilter::new(config.significance_ratio),
            config,
            store,
            fetcher,
            initial,
            stats: None,
            events: Arc::new(EventBus::new()),
            filter: RwLock::new(Filter::all()),
            last_bbox: Mutex::new(None),
            last_viewport: Mutex::new(None),
            next_session: AtomicU64::new(0),
        }
    }

    /// Also fetch summary statistics on every seed
    pub fn with_stats(mut self, source: Arc<dyn StatsSource>) -> Self {
        self.stats = Some(StatsLoader::new(source));
        self
    }

    /// Publish engine events on a shared bus
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Start with a filter other than "all"
    pub fn with_filter(self, filter: Filter) -> Self {
        *self.filter.write() = filter;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn filter(&self) -> Filter {
        self.filter.read().clone()
    }

    /// Latest server-side summary, if a stats source is configured and answered
    pub fn stats(&self) -> Option<SummaryStats> {
        self.stats.as_ref().and_then(StatsLoader::current)
    }

    /// Summary over the records currently loaded
    pub fn local_stats(&self) -> SummaryStats {
        SummaryStats::from_records(&self.store.records())
    }

    /// Seed the store and, if a viewport arrived while seeding, load it
    pub async fn initial_load(&self) -> SeedReport {
        let epoch = self.store.epoch();
        self.seed(epoch, false).await
    }

    /// Switch filter: invalidates every cached bbox and reloads from scratch
    pub async fn set_filter(&self, filter: Filter) -> SeedReport {
        info!(filter = %filter, "filter changed");
        *self.filter.write() = filter;
        let epoch = self.reset();
        self.seed(epoch, true).await
    }

    /// Reload under the same filter, e.g. after an ingestion job finished
    pub async fn refresh(&self) -> SeedReport {
        info!(filter = %self.filter(), "refresh requested");
        let epoch = self.reset();
        self.seed(epoch, true).await
    }

    fn reset(&self) -> Epoch {
        let epoch = self.store.reset();
        self.events.publish(FilterChanged {
            filter: self.filter().to_string(),
            epoch: epoch.0,
        });
        epoch
    }

    async fn seed(&self, epoch: Epoch, reset: bool) -> SeedReport {
        let filter = self.filter();
        let (report, _) = tokio::join!(self.initial.load(epoch), async {
            if let Some(stats) = &self.stats {
                stats.load(&filter).await;
            }
        });
        if report.already_seeded {
            return report;
        }

        self.events.publish(SeedLoaded {
            epoch: epoch.0,
            record_count: report.records,
            failed: report.failed,
        });

        if !report.superseded {
            let pending = *self.last_viewport.lock();
            if let Some(viewport) = pending {
                self.run(viewport, reset).await;
            }
        }
        report
    }

    /// Decide whether `viewport` needs loading and, if so, run a session for it.
    ///
    /// With `reset`, the cache and significance checks are bypassed and the
    /// collection is cleared before the first page.
    pub async fn run(&self, viewport: ViewportState, reset: bool) -> RunOutcome {
        let bbox = viewport.bbox;
        *self.last_viewport.lock() = Some(viewport);

        let epoch = self.store.epoch();
        if !self.store.initial_load_complete() {
            debug!(bbox = %bbox, "viewport load deferred until seed completes");
            return RunOutcome::Skipped(SkipReason::AwaitingSeed);
        }

        if reset {
            *self.last_bbox.lock() = Some(bbox);
            if let Err(e) = self.store.clear_for_reload(epoch) {
                debug!(bbox = %bbox, error = %e, "reset reload superseded");
                return RunOutcome::Skipped(SkipReason::Superseded);
            }
        } else {
            if self.store.is_cached(&bbox) {
                debug!(bbox = %bbox, "bbox already loaded");
                return RunOutcome::Skipped(SkipReason::Cached);
            }

            let mut last = self.last_bbox.lock();
            if !self.significance.should_reload(last.as_ref(), &bbox) {
                debug!(bbox = %bbox, ratio = self.significance.ratio(), "viewport change below significance threshold");
                return RunOutcome::Skipped(SkipReason::Insignificant);
            }
            *last = Some(bbox);
        }

        let session_id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        let session = LoadSession::new(
            session_id,
            epoch,
            self.filter(),
            viewport,
            self.store.clone(),
            self.fetcher.clone(),
        );
        let report = session.run().await;
        self.announce(&report);
        RunOutcome::Ran(report)
    }

    /// Run a viewport load on its own task; it is never cancelled by later events
    pub fn spawn_session(self: &Arc<Self>, viewport: ViewportState) -> JoinHandle<RunOutcome> {
        let engine = self.clone();
        tokio::spawn(async move { engine.run(viewport, false).await })
    }

    /// Subscriber that debounces viewport events into background sessions.
    ///
    /// Must be called within a tokio runtime. The feed holds the engine
    /// weakly; dropping the feed stops its debounce task.
    pub fn viewport_feed(self: &Arc<Self>) -> Arc<ViewportFeed> {
        let engine = Arc::downgrade(self);
        let debouncer = Debouncer::spawn(self.config.debounce(), move |viewport: ViewportState| {
            if let Some(engine) = engine.upgrade() {
                engine.spawn_session(viewport);
            }
        });
        Arc::new(ViewportFeed { debouncer })
    }

    fn announce(&self, report: &SessionReport) {
        match &report.outcome {
            SessionOutcome::Completed => self.events.publish(SessionCompleted {
                session_id: report.session_id,
                bbox: report.bbox.key(),
                pages: report.pages_loaded,
                records: report.records_merged,
            }),
            SessionOutcome::Failed(error) => {
                let page = match error {
                    SyncError::PartialPage { page, .. } => *page,
                    _ => report.pages_loaded + 1,
                };
                warn!(session = report.session_id, bbox = %report.bbox, page, "session failed, bbox left uncached");
                self.events.publish(SessionFailed {
                    session_id: report.session_id,
                    bbox: report.bbox.key(),
                    page,
                    error: error.to_string(),
                });
            }
            SessionOutcome::Superseded => {}
        }
    }
}

/// Debounced bridge from a [`hv_core::ViewportTracker`] to the engine
pub struct ViewportFeed {
    debouncer: Debouncer<ViewportState>,
}

impl ViewportFeed {
    /// Stop reacting to viewport events; sessions already running finish
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }
}

impl ViewportSubscriber for ViewportFeed {
    fn on_viewport_change(&self, viewport: &ViewportState) {
        if !self.debouncer.push(*viewport) {
            warn!("viewport feed is closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{feature, page, ScriptedSource};
    use hv_core::{PageQuery, ViewportTracker};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn viewport(s: &str) -> ViewportState {
        ViewportState::new(s.parse().unwrap(), 13.0)
    }

    /// Seed pages carry no bbox; viewport pages echo their page number
    fn two_page_source() -> Arc<ScriptedSource> {
        ScriptedSource::new(|q| {
            Ok(match q.bbox {
                None => page(vec![feature("seed", 0.4)], 1),
                Some(_) => page(vec![feature(&format!("p{}", q.page), 0.6)], 2),
            })
        })
    }

    #[tokio::test]
    async fn test_viewport_loads_wait_for_seed() {
        let source = two_page_source();
        let engine = SyncEngine::new(source.clone(), SyncConfig::default());

        let outcome = engine.run(viewport("0,0,10,10"), false).await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::AwaitingSeed));
        assert_eq!(source.call_count(), 0);

        // The deferred viewport is loaded once the seed settles
        engine.initial_load().await;
        assert_eq!(source.viewport_calls().len(), 2);
        assert!(engine.store().is_cached(&"0,0,10,10".parse().unwrap()));
        assert_eq!(engine.store().len(), 3);
    }

    #[tokio::test]
    async fn test_cached_and_insignificant_moves_are_skipped() {
        let source = two_page_source();
        let engine = SyncEngine::new(source.clone(), SyncConfig::default());
        engine.initial_load().await;

        assert!(engine.run(viewport("0,0,10,10"), false).await.report().is_some());
        assert_eq!(
            engine.run(viewport("0,0,10,10"), false).await.skip_reason(),
            Some(SkipReason::Cached)
        );
        assert_eq!(
            engine.run(viewport("2,0,12,10"), false).await.skip_reason(),
            Some(SkipReason::Insignificant)
        );
        assert!(engine.run(viewport("4,0,14,10"), false).await.report().is_some());
        assert_eq!(source.viewport_calls().len(), 4);
    }

    #[tokio::test]
    async fn test_filter_change_refetches_identical_bbox() {
        let source = two_page_source();
        let engine = SyncEngine::new(source.clone(), SyncConfig::default());
        engine.initial_load().await;
        let bbox: Bbox = "0,0,10,10".parse().unwrap();

        engine.run(viewport("0,0,10,10"), false).await;
        assert!(engine.store().is_cached(&bbox));
        let before = source.viewport_calls().len();

        engine.set_filter(Filter::region("Shirur")).await;

        let calls = source.viewport_calls();
        assert!(calls.len() > before);
        let refetch = &calls[before];
        assert_eq!(refetch.bbox, Some(bbox));
        assert_eq!(refetch.filter.region_name(), Some("Shirur"));
        assert!(engine.store().is_cached(&bbox));
        assert!(engine.store().get("seed").is_none());
    }

    #[tokio::test]
    async fn test_seed_stays_unfiltered_after_filter_change() {
        let source = two_page_source();
        let engine = SyncEngine::new(source.clone(), SyncConfig::default());
        engine.initial_load().await;

        engine.set_filter(Filter::region("Shirur")).await;

        let seeds: Vec<PageQuery> = source
            .calls
            .lock()
            .iter()
            .filter(|q| q.bbox.is_none())
            .cloned()
            .collect();
        assert_eq!(seeds.len(), 2);
        assert!(seeds.iter().all(|q| q.filter.is_all()));
        assert!(engine.store().initial_load_complete());
    }

    #[tokio::test]
    async fn test_repeated_initial_load_keeps_cached_viewport() {
        let source = two_page_source();
        let engine = SyncEngine::new(source.clone(), SyncConfig::default());
        engine.initial_load().await;
        let bbox: Bbox = "0,0,10,10".parse().unwrap();
        engine.run(viewport("0,0,10,10"), false).await;
        assert_eq!(engine.store().len(), 3);
        let calls = source.call_count();

        let report = engine.initial_load().await;

        assert!(report.already_seeded);
        assert_eq!(source.call_count(), calls);
        assert_eq!(engine.store().len(), 3);
        assert!(engine.store().get("p1").is_some());
        assert!(engine.store().is_cached(&bbox));
    }

    #[tokio::test]
    async fn test_refresh_clears_cache_and_reloads() {
        let source = two_page_source();
        let engine = SyncEngine::new(source.clone(), SyncConfig::default());
        engine.initial_load().await;
        engine.run(viewport("0,0,10,10"), false).await;
        let before = source.call_count();

        let report = engine.refresh().await;

        assert!(!report.failed);
        // Seed plus both viewport pages again
        assert_eq!(source.call_count(), before + 3);
        assert_eq!(engine.store().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_bbox_is_retried_on_revisit() {
        let fail_page_two = Arc::new(AtomicUsize::new(1));
        let budget = fail_page_two.clone();
        let source = ScriptedSource::new(move |q| match (q.bbox, q.page) {
            (None, _) => Ok(page(Vec::new(), 1)),
            (Some(_), 2) if budget.load(Ordering::SeqCst) > 0 => {
                budget.fetch_sub(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("502 Bad Gateway"))
            }
            (Some(_), p) => Ok(page(vec![feature(&format!("p{}", p), 0.5)], 2)),
        });
        let engine = SyncEngine::new(source.clone(), SyncConfig::default());
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        engine.events().on::<SessionFailed, _>(move |event| {
            assert_eq!(event.page, 2);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        engine.initial_load().await;
        let home: Bbox = "0,0,10,10".parse().unwrap();

        engine.run(viewport("0,0,10,10"), false).await;
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(engine.store().get("p1").is_some());
        assert!(!engine.store().is_loading());
        assert!(!engine.store().is_cached(&home));

        engine.run(viewport("50,50,60,60"), false).await;
        let back = engine.run(viewport("0,0,10,10"), false).await;
        assert!(back.report().unwrap().is_complete());
        assert!(engine.store().is_cached(&home));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_events_are_debounced_into_one_session() {
        let source = two_page_source();
        let engine = Arc::new(SyncEngine::new(source.clone(), SyncConfig::default()));
        engine.initial_load().await;

        let tracker = ViewportTracker::new();
        let feed = engine.viewport_feed();
        tracker.add_subscriber(feed.clone());

        for offset in [0.0, 1.0, 2.0, 20.0] {
            tracker
                .on_viewport_change(Bbox::new(offset, 0.0, offset + 10.0, 10.0), 13.0)
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(source.viewport_calls().is_empty());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let calls = source.viewport_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].bbox, Some(Bbox::new(20.0, 0.0, 30.0, 10.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_session_survives_newer_viewport() {
        let source = ScriptedSource::delayed(Duration::from_millis(1000), |q| {
            Ok(match q.bbox {
                None => page(Vec::new(), 1),
                Some(b) => page(vec![feature(&format!("{}-{}", b.min_x, q.page), 0.5)], 2),
            })
        });
        let engine = Arc::new(SyncEngine::new(source.clone(), SyncConfig::default()));
        engine.initial_load().await;
        let feed = engine.viewport_feed();

        feed.on_viewport_change(&viewport("0,0,10,10"));
        // Debounce fires at 800ms; the first session is then mid-flight
        tokio::time::sleep(Duration::from_millis(1500)).await;
        feed.on_viewport_change(&viewport("100,100,110,110"));
        tokio::time::sleep(Duration::from_millis(5000)).await;

        let store = engine.store();
        assert!(store.is_cached(&"0,0,10,10".parse().unwrap()));
        assert!(store.is_cached(&"100,100,110,110".parse().unwrap()));
        assert_eq!(store.len(), 4);
    }
}
