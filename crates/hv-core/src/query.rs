//! Filters and page queries sent to the record source

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::viewport::Bbox;

/// Active record filter. Only the region (village) is filterable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    region: Option<String>,
}

impl Filter {
    /// No filtering
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter to one region; `"all"` and blank names mean no filter
    pub fn region(name: impl AsRef<str>) -> Self {
        let name = name.as_ref().trim();
        if name.is_empty() || name.eq_ignore_ascii_case("all") {
            Self::all()
        } else {
            Self {
                region: Some(name.to_string()),
            }
        }
    }

    pub fn region_name(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn is_all(&self) -> bool {
        self.region.is_none()
    }

    /// Whether a record in `region` passes this filter
    pub fn matches(&self, region: &str) -> bool {
        self.region.as_deref().map_or(true, |r| r == region)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.region.as_deref().unwrap_or("all"))
    }
}

/// One paged fetch: `(filter, bbox, zoom, page, page_size)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageQuery {
    pub filter: Filter,
    pub bbox: Option<Bbox>,
    pub zoom: Option<f64>,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

impl PageQuery {
    /// Viewport-independent query, as used for the seed snapshot
    pub fn unbounded(filter: Filter, page_size: u32) -> Self {
        Self {
            filter,
            bbox: None,
            zoom: None,
            page: 1,
            page_size,
        }
    }

    pub fn for_viewport(filter: Filter, bbox: Bbox, zoom: f64, page_size: u32) -> Self {
        Self {
            filter,
            bbox: Some(bbox),
            zoom: Some(zoom),
            page: 1,
            page_size,
        }
    }

    /// Same query for another page
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_normalized() {
        assert!(Filter::region("all").is_all());
        assert!(Filter::region("  ").is_all());
        assert_eq!(Filter::region("Shirur").region_name(), Some("Shirur"));
        assert!(Filter::region("Shirur").matches("Shirur"));
        assert!(!Filter::region("Shirur").matches("Pune"));
        assert!(Filter::all().matches("anything"));
    }
}
