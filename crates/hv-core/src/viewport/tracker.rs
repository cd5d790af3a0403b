//! Viewport tracker implementation

use super::{Bbox, ViewportState, ViewportSubscriber};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Tracker state stored internally
#[derive(Debug, Clone, Default)]
struct TrackerState {
    current: Option<ViewportState>,
    changes: u64,
}

/// Receives bbox+zoom events from the map widget and fans them out
pub struct ViewportTracker {
    state: Arc<RwLock<TrackerState>>,
    subscribers: Arc<RwLock<Vec<Weak<dyn ViewportSubscriber>>>>,
}

impl ViewportTracker {
    /// Create a new tracker with no known viewport
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(TrackerState::default())),
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Report a move or zoom end from the map.
    ///
    /// Rejects non-finite or inverted boxes and negative zoom levels.
    pub fn on_viewport_change(&self, bbox: Bbox, zoom: f64) -> Result<(), String> {
        if !bbox.is_valid() {
            return Err(format!("Invalid bbox {}", bbox));
        }
        if !zoom.is_finite() || zoom < 0.0 {
            return Err(format!("Invalid zoom level {}", zoom));
        }

        let viewport = ViewportState::new(bbox, zoom);
        let mut state = self.state.write();
        state.current = Some(viewport);
        state.changes += 1;
        drop(state);

        trace!(bbox = %bbox, zoom, "viewport changed");
        self.notify_subscribers(&viewport);
        Ok(())
    }

    /// Last reported viewport
    pub fn current(&self) -> Option<ViewportState> {
        self.state.read().current
    }

    /// Number of accepted viewport events
    pub fn change_count(&self) -> u64 {
        self.state.read().changes
    }

    /// Add a subscriber
    pub fn add_subscriber(&self, subscriber: Arc<dyn ViewportSubscriber>) {
        let mut subscribers = self.subscribers.write();
        subscribers.push(Arc::downgrade(&subscriber));
    }

    /// Notify all subscribers of a viewport change
    fn notify_subscribers(&self, viewport: &ViewportState) {
        let live: Vec<Arc<dyn ViewportSubscriber>> = {
            let mut subscribers = self.subscribers.write();

            // Remove any dead weak references
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };

        for subscriber in live {
            subscriber.on_viewport_change(viewport);
        }
    }
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::new()
    }
}
