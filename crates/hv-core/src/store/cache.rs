//! Set of bboxes fully loaded under the current filter

use ahash::AHashSet;

use crate::viewport::Bbox;

/// Exact-key bbox cache.
///
/// Lookups match the canonical key string only; a bbox geometrically inside
/// a cached one is still a miss.
#[derive(Debug, Default, Clone)]
pub struct BboxCache {
    keys: AHashSet<String>,
}

impl BboxCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this exact bbox has been fully loaded
    pub fn has(&self, bbox: &Bbox) -> bool {
        self.keys.contains(&bbox.key())
    }

    /// Mark a bbox as fully loaded
    pub fn record(&mut self, bbox: &Bbox) {
        self.keys.insert(bbox.key());
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_only() {
        let mut cache = BboxCache::new();
        cache.record(&Bbox::new(0.0, 0.0, 10.0, 10.0));

        assert!(cache.has(&Bbox::new(0.0, 0.0, 10.0, 10.0)));
        // Contained, but not the same key
        assert!(!cache.has(&Bbox::new(1.0, 1.0, 9.0, 9.0)));

        cache.clear();
        assert!(cache.is_empty());
    }
}
