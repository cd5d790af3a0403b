//! Viewport-driven loading, caching and ingestion polling for the harvest monitor

pub mod config;
pub mod debounce;
pub mod engine;
pub mod initial;
pub mod poller;
pub mod session;
pub mod significance;
pub mod sources;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

use hv_core::StoreError;
use thiserror::Error;
use tokio::task::JoinError;

// Re-exports
pub use config::SyncConfig;
pub use debounce::Debouncer;
pub use engine::{RunOutcome, SkipReason, SyncEngine, ViewportFeed};
pub use initial::{InitialLoader, SeedReport};
pub use poller::{JobPoller, JobState, StartOutcome};
pub use session::{LoadSession, PageFetcher, SessionOutcome, SessionReport};
pub use significance::{is_significant, SignificanceFilter};
pub use sources::GeoJsonSource;
pub use stats::StatsLoader;

/// Errors that can occur while syncing records or polling jobs
#[derive(Error, Debug)]
pub enum SyncError {
    /// Fetch rejected or non-success response
    #[error("Network failure: {0}")]
    Network(String),

    /// A page after the first failed mid-session
    #[error("Page {page} failed after {merged} records were merged: {message}")]
    PartialPage {
        page: u32,
        merged: usize,
        message: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid job transition: {0}")]
    JobTransition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),
}

impl SyncError {
    /// Wrap a collaborator error, keeping its context chain in the message
    pub fn network(error: anyhow::Error) -> Self {
        SyncError::Network(format!("{:#}", error))
    }
}
