//! Summary statistics over a record collection

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Health change that maps to a 100% trend
const HEALTH_CHANGE_SCALE: f64 = 0.5;

/// Aggregate counts and averages, in the stats endpoint's wire format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    #[serde(rename = "total_farms", default)]
    pub total_records: u64,

    #[serde(rename = "harvest_ready_count", default)]
    pub ready_count: u64,

    #[serde(rename = "harvest_ready_percentage", default)]
    pub ready_percentage: f64,

    #[serde(rename = "avg_ndvi", default)]
    pub avg_health: f64,

    #[serde(rename = "avg_ndvi_change", default)]
    pub avg_health_change: f64,

    #[serde(default)]
    pub total_area: f64,

    #[serde(rename = "total_harvest_area", default)]
    pub ready_area: f64,
}

impl SummaryStats {
    /// Compute the summary locally over whatever records are loaded
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut stats = SummaryStats::default();
        let mut health_sum = 0.0;
        let mut change_sum = 0.0;

        for record in records {
            stats.total_records += 1;
            stats.total_area += record.area;
            health_sum += record.recent_health;
            change_sum += record.health_change();
            if record.ready {
                stats.ready_count += 1;
                stats.ready_area += record.area;
            }
        }

        if stats.total_records > 0 {
            let n = stats.total_records as f64;
            stats.avg_health = health_sum / n;
            stats.avg_health_change = change_sum / n;
            stats.ready_percentage = stats.ready_count as f64 / n * 100.0;
        }
        stats
    }

    /// Average health change expressed as a trend percentage
    pub fn health_change_percent(&self) -> f64 {
        self.avg_health_change / HEALTH_CHANGE_SCALE * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, area: f64, recent: f64, prev: f64, ready: bool) -> Record {
        Record {
            id: id.to_string(),
            name: id.to_string(),
            region: "Shirur".to_string(),
            area,
            recent_health: recent,
            previous_health: prev,
            ready,
            boundary: Vec::new(),
        }
    }

    #[test]
    fn test_summary_from_records() {
        let records = vec![
            record("a", 2.0, 0.8, 0.6, true),
            record("b", 3.0, 0.4, 0.5, false),
        ];

        let stats = SummaryStats::from_records(&records);
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.ready_count, 1);
        assert_eq!(stats.ready_percentage, 50.0);
        assert_eq!(stats.total_area, 5.0);
        assert_eq!(stats.ready_area, 2.0);
        assert!((stats.avg_health - 0.6).abs() < 1e-9);
        assert!((stats.health_change_percent() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary_is_zeroed() {
        let stats = SummaryStats::from_records(std::iter::empty());
        assert_eq!(stats, SummaryStats::default());
    }

    #[test]
    fn test_wire_names() {
        let stats: SummaryStats =
            serde_json::from_str(r#"{"total_farms": 3, "avg_ndvi": 0.5}"#).unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.avg_health, 0.5);
    }
}
