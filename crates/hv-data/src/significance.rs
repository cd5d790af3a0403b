//! Decides whether a new bbox moved far enough to justify a reload

use hv_core::Bbox;

/// Whether the min corner moved more than `ratio` of the old width or height.
///
/// Only the min corner is compared; zooming in place around a fixed min
/// corner is not significant on its own.
pub fn is_significant(previous: &Bbox, next: &Bbox, ratio: f64) -> bool {
    let dx = (next.min_x - previous.min_x).abs();
    let dy = (next.min_y - previous.min_y).abs();
    dx > ratio * previous.width() || dy > ratio * previous.height()
}

/// Significance check against the last served bbox
#[derive(Debug, Clone, Copy)]
pub struct SignificanceFilter {
    ratio: f64,
}

impl SignificanceFilter {
    pub fn new(ratio: f64) -> Self {
        Self { ratio }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// The first viewport is always significant
    pub fn should_reload(&self, previous: Option<&Bbox>, next: &Bbox) -> bool {
        previous.map_or(true, |prev| is_significant(prev, next, self.ratio))
    }
}

impl Default for SignificanceFilter {
    fn default() -> Self {
        Self::new(0.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(s: &str) -> Bbox {
        s.parse().unwrap()
    }

    #[test]
    fn test_threshold_examples() {
        assert!(is_significant(&bbox("0,0,10,10"), &bbox("4,0,10,10"), 0.3));
        assert!(!is_significant(&bbox("0,0,10,10"), &bbox("2,0,10,10"), 0.3));
        // Exactly at the threshold is not enough
        assert!(!is_significant(&bbox("0,0,10,10"), &bbox("3,0,13,10"), 0.3));
    }

    #[test]
    fn test_vertical_motion_counts() {
        assert!(is_significant(&bbox("0,0,10,20"), &bbox("0,-7,10,13"), 0.3));
        assert!(!is_significant(&bbox("0,0,10,20"), &bbox("0,-5,10,15"), 0.3));
    }

    #[test]
    fn test_first_viewport_is_significant() {
        let filter = SignificanceFilter::default();
        assert!(filter.should_reload(None, &bbox("0,0,1,1")));
        assert!(!filter.should_reload(Some(&bbox("0,0,1,1")), &bbox("0,0,1,1")));
    }
}
