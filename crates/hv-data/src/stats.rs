//! Summary statistics fetched alongside the records

use std::sync::Arc;

use hv_core::{Filter, StatsSource, SummaryStats};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Keeps the latest server-side summary for the active filter
pub struct StatsLoader {
    source: Arc<dyn StatsSource>,
    current: RwLock<Option<SummaryStats>>,
}

impl StatsLoader {
    pub fn new(source: Arc<dyn StatsSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
        }
    }

    /// Refetch the summary; a failure clears it rather than keeping stale numbers
    pub async fn load(&self, filter: &Filter) -> Option<SummaryStats> {
        let stats = match self.source.summary(filter).await {
            Ok(stats) => {
                debug!(filter = %filter, total = stats.total_records, "stats loaded");
                Some(stats)
            }
            Err(e) => {
                warn!(filter = %filter, error = %format!("{:#}", e), "stats unavailable");
                None
            }
        };
        *self.current.write() = stats.clone();
        stats
    }

    pub fn current(&self) -> Option<SummaryStats> {
        self.current.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyStats {
        fail: AtomicBool,
    }

    #[async_trait]
    impl StatsSource for FlakyStats {
        async fn summary(&self, filter: &Filter) -> anyhow::Result<SummaryStats> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("stats endpoint down");
            }
            Ok(SummaryStats {
                total_records: if filter.is_all() { 10 } else { 4 },
                ..SummaryStats::default()
            })
        }
    }

    #[tokio::test]
    async fn test_failure_clears_previous_stats() {
        let source = Arc::new(FlakyStats {
            fail: AtomicBool::new(false),
        });
        let loader = StatsLoader::new(source.clone());

        let stats = loader.load(&Filter::region("Shirur")).await.unwrap();
        assert_eq!(stats.total_records, 4);
        assert!(loader.current().is_some());

        source.fail.store(true, Ordering::SeqCst);
        assert!(loader.load(&Filter::all()).await.is_none());
        assert!(loader.current().is_none());
    }
}
