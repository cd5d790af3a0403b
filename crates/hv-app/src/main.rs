//! Headless harvest monitor: seeds the record store, replays a map tour and
//! optionally ingests a CSV upload

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use hv_core::events::events::{JobStatusChanged, SessionCompleted, SessionFailed};
use hv_core::events::EventBus;
use hv_core::{Bbox, Filter, HealthBand, RecordSnapshot, RecordSubscriber, Upload, ViewportTracker};
use hv_data::{GeoJsonSource, JobPoller, JobState, StartOutcome, SyncConfig, SyncEngine};

mod demo;

#[derive(Parser)]
#[command(name = "harvestview")]
#[command(about = "Viewport-driven farm record sync", long_about = None)]
struct Cli {
    /// GeoJSON FeatureCollection to serve records from; synthetic farms if omitted
    #[arg(long)]
    geojson: Option<PathBuf>,

    /// JSON file overriding sync settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Village filter ("all" for none)
    #[arg(long, default_value = "all")]
    village: String,

    /// Viewports to visit, as minX,minY,maxX,maxY; defaults to a tour of the seed bounds
    #[arg(long = "pan", value_name = "BBOX")]
    pans: Vec<Bbox>,

    /// Zoom level reported with every viewport
    #[arg(long, default_value_t = 14.0)]
    zoom: f64,

    /// CSV file to submit for ingestion once the tour is done
    #[arg(long)]
    upload: Option<PathBuf>,
}

/// Logs every store publication at debug level
struct RecordLog;

impl RecordSubscriber for RecordLog {
    fn on_records_changed(&self, snapshot: &RecordSnapshot) {
        debug!(
            revision = snapshot.revision,
            records = snapshot.records.len(),
            loading = snapshot.loading,
            "records changed"
        );
    }
}

fn default_tour(bounds: Bbox) -> Vec<Bbox> {
    let (w, h) = (bounds.width() / 2.0, bounds.height() / 2.0);
    let quarter = |x: f64, y: f64| Bbox::new(x, y, x + w, y + h);
    vec![
        quarter(bounds.min_x, bounds.min_y),
        quarter(bounds.min_x + w, bounds.min_y),
        quarter(bounds.min_x + w, bounds.min_y + h),
        quarter(bounds.min_x, bounds.min_y + h),
        // Back to the start: served from cache
        quarter(bounds.min_x, bounds.min_y),
    ]
}

fn log_bus(events: &EventBus) {
    events.on::<SessionCompleted, _>(|event| {
        info!(session = event.session_id, bbox = %event.bbox, pages = event.pages, records = event.records, "session completed");
    });
    events.on::<SessionFailed, _>(|event| {
        warn!(session = event.session_id, bbox = %event.bbox, page = event.page, error = %event.error, "session failed");
    });
    events.on::<JobStatusChanged, _>(|event| {
        info!(job_id = %event.job_id, status = %event.status, log_lines = event.log_lines, "job status");
    });
}

fn print_summary(engine: &SyncEngine) {
    let store = engine.store();
    let records = store.records();
    let stats = engine.local_stats();

    println!("filter:          {}", engine.filter());
    println!("records loaded:  {}", records.len());
    println!("bboxes cached:   {}", store.cached_count());
    println!(
        "ready:           {} ({:.1}%)",
        stats.ready_count, stats.ready_percentage
    );
    println!(
        "avg health:      {:.3} (trend {:+.1}%)",
        stats.avg_health,
        stats.health_change_percent()
    );
    for band in [
        HealthBand::Excellent,
        HealthBand::Good,
        HealthBand::Moderate,
        HealthBand::Poor,
        HealthBand::Critical,
    ] {
        let count = records.iter().filter(|r| r.health_band() == band).count();
        println!("  {:<10} {:>6}  {}", format!("{:?}", band), count, band.color());
    }
    if let Some(server) = engine.stats() {
        println!(
            "source totals:   {} farms, {:.1} ha",
            server.total_records, server.total_area
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SyncConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SyncConfig::default(),
    };
    config.validate()?;

    let source = match &cli.geojson {
        Some(path) => GeoJsonSource::from_path(path.clone())
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            info!("no GeoJSON given, using synthetic farms");
            GeoJsonSource::from_features("demo", demo::demo_features(40, 40))
        }
    };
    let source = Arc::new(source);

    let events = Arc::new(EventBus::new());
    log_bus(&events);

    let engine = Arc::new(
        SyncEngine::new(source.clone(), config.clone())
            .with_stats(source.clone())
            .with_events(events.clone())
            .with_filter(Filter::region(&cli.village)),
    );
    let record_log = Arc::new(RecordLog);
    engine.store().subscribe(record_log.clone());

    let seed = engine.initial_load().await;
    info!(records = seed.records, failed = seed.failed, "seed loaded");

    let tour = if cli.pans.is_empty() {
        match seed.bounds {
            Some(bounds) => default_tour(bounds),
            None => default_tour(Bbox::new(73.8, 18.4, 74.6, 19.2)),
        }
    } else {
        cli.pans.clone()
    };

    let tracker = ViewportTracker::new();
    let feed = engine.viewport_feed();
    tracker.add_subscriber(feed.clone());

    let settle = engine.config().debounce() + Duration::from_millis(250);
    for bbox in tour {
        tracker
            .on_viewport_change(bbox, cli.zoom)
            .map_err(anyhow::Error::msg)?;
        tokio::time::sleep(settle).await;
    }

    if let Some(path) = &cli.upload {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let upload = Upload::new(file_name, bytes);

        let refreshed = Arc::new(Notify::new());
        let hook_engine = engine.clone();
        let hook_done = refreshed.clone();
        let poller = JobPoller::new(Arc::new(demo::LocalIngest::new()), &config)
            .with_events(events.clone())
            .on_complete(move |job_id| {
                info!(job_id, "ingestion finished, refreshing records");
                let engine = hook_engine.clone();
                let done = hook_done.clone();
                tokio::spawn(async move {
                    engine.refresh().await;
                    done.notify_one();
                });
            });

        match poller.start(Some(&upload)).await? {
            StartOutcome::Polling(handle) => {
                if let JobState::Finished { .. } = handle.await? {
                    refreshed.notified().await;
                }
            }
            StartOutcome::Rejected(message) => warn!(%message, "upload rejected"),
            StartOutcome::NoFile => {}
        }
        let state = poller.state();
        if let (Some(job_id), Some(status)) = (state.job_id(), state.status()) {
            println!("job {}: {}", job_id, status);
        }
        for line in poller.logs() {
            println!("job: {}", line);
        }
    }

    feed.cancel();
    print_summary(&engine);
    Ok(())
}
