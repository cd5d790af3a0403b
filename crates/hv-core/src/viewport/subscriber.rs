//! Viewport subscriber trait

use super::ViewportState;

/// Trait for components that need to respond to viewport changes
pub trait ViewportSubscriber: Send + Sync {
    /// Called when the map settles on a new bbox or zoom
    fn on_viewport_change(&self, viewport: &ViewportState);
}
