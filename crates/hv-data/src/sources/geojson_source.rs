use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use hv_core::{
    Bbox, Feature, FeaturePage, Filter, PageMetadata, PageQuery, RecordSource, StatsSource,
    SummaryStats,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::SyncError;

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

/// In-memory record source over a GeoJSON FeatureCollection.
///
/// Answers paged queries the way the listing endpoint does: exact region
/// match, bbox filter on ring vertices, then 1-based pagination.
pub struct GeoJsonSource {
    name: String,
    features: Arc<Vec<Feature>>,
}

impl GeoJsonSource {
    /// Load a FeatureCollection file
    pub async fn from_path(path: PathBuf) -> Result<Self, SyncError> {
        let name = path.display().to_string();
        let features = tokio::task::spawn_blocking(move || -> Result<Vec<Feature>, SyncError> {
            let file = File::open(&path)?;
            let collection: FeatureCollection = serde_json::from_reader(BufReader::new(file))?;
            Ok(collection.features)
        })
        .await??;

        info!(source = %name, features = features.len(), "GeoJSON source loaded");
        Ok(Self::from_features(name, features))
    }

    pub fn from_features(name: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            features: Arc::new(features),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn select<'a>(&'a self, filter: &'a Filter, bbox: Option<&'a Bbox>) -> impl Iterator<Item = &'a Feature> + 'a {
        self.features
            .iter()
            .filter(move |feature| {
                feature
                    .region()
                    .map_or(filter.is_all(), |region| filter.matches(&region))
            })
            .filter(move |feature| match bbox {
                Some(bbox) => feature
                    .outer_ring()
                    .iter()
                    .any(|[lng, lat]| bbox.contains(*lng, *lat)),
                None => true,
            })
    }
}

#[async_trait]
impl RecordSource for GeoJsonSource {
    async fn fetch_page(&self, query: &PageQuery) -> anyhow::Result<FeaturePage> {
        let matching: Vec<&Feature> = self.select(&query.filter, query.bbox.as_ref()).collect();
        let page_size = query.page_size.max(1) as usize;
        let total = matching.len();
        let total_pages = total.div_ceil(page_size) as u32;
        let start = (query.page.max(1) as usize - 1) * page_size;

        let features: Vec<Feature> = matching
            .into_iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();

        debug!(
            source = %self.name,
            page = query.page,
            returned = features.len(),
            total,
            "page served"
        );

        Ok(FeaturePage {
            features,
            metadata: PageMetadata {
                total_pages: Some(total_pages),
                total: Some(total as u64),
            },
        })
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl StatsSource for GeoJsonSource {
    async fn summary(&self, filter: &Filter) -> anyhow::Result<SummaryStats> {
        // The stats endpoint compares regions case-insensitively
        let records: Vec<_> = self
            .features
            .iter()
            .filter(|feature| match filter.region_name() {
                Some(wanted) => feature
                    .region()
                    .is_some_and(|region| region.eq_ignore_ascii_case(wanted)),
                None => true,
            })
            .filter_map(hv_core::Record::from_feature)
            .collect();
        Ok(SummaryStats::from_records(&records))
    }
}
