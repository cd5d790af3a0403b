//! Tunables for paging, debouncing, significance and job polling

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::SyncError;

/// Engine configuration. Every field has a default, so a config file only
/// needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records requested per viewport page
    pub page_size: u32,

    /// Upper bound on pages fetched per viewport session
    pub max_pages: u32,

    /// Size of the viewport-independent seed snapshot
    pub seed_count: u32,

    /// Quiescence required before a viewport change triggers a load
    pub debounce_ms: u64,

    /// Fraction of the old bbox width/height the min corner must move
    pub significance_ratio: f64,

    /// Delay between job status polls
    pub poll_interval_ms: u64,

    /// Consecutive failed status fetches tolerated before a job is marked errored
    pub max_poll_failures: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_pages: 5,
            seed_count: 50,
            debounce_ms: 800,
            significance_ratio: 0.3,
            poll_interval_ms: 1500,
            max_poll_failures: 5,
        }
    }
}

impl SyncConfig {
    /// Load and validate a JSON config file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SyncError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Parse and validate a JSON config document
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        let config: SyncConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.page_size == 0 || self.max_pages == 0 || self.seed_count == 0 {
            return Err(SyncError::Config(
                "page_size, max_pages and seed_count must be non-zero".to_string(),
            ));
        }
        if !(self.significance_ratio > 0.0 && self.significance_ratio <= 1.0) {
            return Err(SyncError::Config(format!(
                "significance_ratio must be in (0, 1], got {}",
                self.significance_ratio
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(SyncError::Config("poll_interval_ms must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Worst-case records held per viewport
    pub fn max_records_per_viewport(&self) -> u64 {
        self.page_size as u64 * self.max_pages as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_bound_a_viewport_to_5000_records() {
        let config = SyncConfig::default();
        assert_eq!(config.max_records_per_viewport(), 5000);
        assert_eq!(config.debounce(), Duration::from_millis(800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = SyncConfig::from_json(r#"{ "page_size": 200 }"#).unwrap();
        assert_eq!(config.page_size, 200);
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.poll_interval_ms, 1500);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            SyncConfig::from_json(r#"{ "max_pages": 0 }"#),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::from_json(r#"{ "significance_ratio": 1.5 }"#),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::from_json("not json"),
            Err(SyncError::Json(_))
        ));
    }
}
