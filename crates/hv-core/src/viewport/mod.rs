//! Viewport tracking: bounding boxes, zoom, and change notification

use serde::{Deserialize, Serialize};

mod bbox;
mod subscriber;
mod tracker;

pub use bbox::{Bbox, BboxParseError};
pub use subscriber::ViewportSubscriber;
pub use tracker::ViewportTracker;

/// Visible map region plus zoom level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub bbox: Bbox,
    pub zoom: f64,
}

impl ViewportState {
    pub fn new(bbox: Bbox, zoom: f64) -> Self {
        Self { bbox, zoom }
    }
}
