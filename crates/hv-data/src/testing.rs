//! Scripted collaborators shared by the unit tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hv_core::{Feature, FeaturePage, PageMetadata, PageQuery, RecordSource};
use parking_lot::Mutex;
use serde_json::json;

type Script = dyn Fn(&PageQuery) -> anyhow::Result<FeaturePage> + Send + Sync;

/// Record source answering from a closure and logging every query
pub struct ScriptedSource {
    script: Box<Script>,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<PageQuery>>,
}

impl ScriptedSource {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&PageQuery) -> anyhow::Result<FeaturePage> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            delay: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Same, but every response takes `delay` to arrive
    pub fn delayed<F>(delay: Duration, script: F) -> Arc<Self>
    where
        F: Fn(&PageQuery) -> anyhow::Result<FeaturePage> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            delay: Some(delay),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Calls that carried a bbox, i.e. viewport page requests
    pub fn viewport_calls(&self) -> Vec<PageQuery> {
        self.calls
            .lock()
            .iter()
            .filter(|q| q.bbox.is_some())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn fetch_page(&self, query: &PageQuery) -> anyhow::Result<FeaturePage> {
        self.calls.lock().push(query.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.script)(query)
    }

    fn source_name(&self) -> &str {
        "scripted"
    }
}

/// Minimal feature with an id, a health reading and a one-point ring
pub fn feature(id: &str, recent: f64) -> Feature {
    serde_json::from_value(json!({
        "geometry": { "type": "Polygon", "coordinates": [[[73.0, 19.0]]] },
        "properties": { "farm_id": id, "recent_ndvi": recent, "Vill_Name": "Shirur" }
    }))
    .expect("valid feature literal")
}

pub fn page(features: Vec<Feature>, total_pages: u32) -> FeaturePage {
    FeaturePage {
        features,
        metadata: PageMetadata {
            total_pages: Some(total_pages),
            total: None,
        },
    }
}
