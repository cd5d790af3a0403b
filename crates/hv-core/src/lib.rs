//! Core functionality for the harvest monitor sync engine
//!
//! This crate provides the domain types, the shared record store and the
//! collaborator traits the sync engine is built on.

pub mod events;
pub mod job;
pub mod query;
pub mod record;
pub mod stats;
pub mod store;
pub mod viewport;

// Re-export commonly used types
pub use job::{JobSnapshot, JobStatus, JobTicket, Upload};
pub use query::{Filter, PageQuery};
pub use record::{Feature, FeaturePage, HealthBand, PageMetadata, Record};
pub use stats::SummaryStats;
pub use store::{BboxCache, Epoch, LoadPhase, RecordSnapshot, RecordStore, RecordSubscriber, StoreError};
pub use viewport::{Bbox, ViewportState, ViewportSubscriber, ViewportTracker};
pub use data::{IngestClient, RecordSource, StatsSource};

/// External collaborators the engine consumes
pub mod data {
    use crate::job::{JobSnapshot, JobTicket, Upload};
    use crate::query::{Filter, PageQuery};
    use crate::record::FeaturePage;
    use crate::stats::SummaryStats;

    /// Paged record fetch keyed by filter, bbox and zoom
    #[async_trait::async_trait]
    pub trait RecordSource: Send + Sync {
        /// Fetch one page of features
        async fn fetch_page(&self, query: &PageQuery) -> anyhow::Result<FeaturePage>;

        /// Get the source name/path
        fn source_name(&self) -> &str;
    }

    /// Aggregate statistics, optionally filtered
    #[async_trait::async_trait]
    pub trait StatsSource: Send + Sync {
        async fn summary(&self, filter: &Filter) -> anyhow::Result<SummaryStats>;
    }

    /// Ingestion endpoint: file submission and job status
    #[async_trait::async_trait]
    pub trait IngestClient: Send + Sync {
        /// Submit a file for ingestion
        async fn submit(&self, upload: &Upload) -> anyhow::Result<JobTicket>;

        /// Current status and full log list of a job
        async fn job(&self, job_id: &str) -> anyhow::Result<JobSnapshot>;
    }
}
