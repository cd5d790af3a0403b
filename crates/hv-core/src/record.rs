//! Farm records and the wire features they are decoded from

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// A single geospatial record as rendered on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier, the merge key
    pub id: String,

    /// Display name (farmer name, falls back to the id)
    pub name: String,

    /// Region (village) the record belongs to
    pub region: String,

    /// Area in acres
    pub area: f64,

    /// Most recent health index reading
    pub recent_health: f64,

    /// Previous health index reading
    pub previous_health: f64,

    /// Whether the record is flagged ready for harvest
    pub ready: bool,

    /// Polygon boundary as `[lat, lng]` pairs
    pub boundary: Vec<[f64; 2]>,
}

/// Health classification of a record's recent reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthBand {
    Excellent,
    Good,
    Moderate,
    Poor,
    Critical,
}

impl HealthBand {
    /// Classify a health index reading
    pub fn classify(value: f64) -> Self {
        if value >= 0.7 {
            HealthBand::Excellent
        } else if value >= 0.6 {
            HealthBand::Good
        } else if value >= 0.5 {
            HealthBand::Moderate
        } else if value >= 0.4 {
            HealthBand::Poor
        } else {
            HealthBand::Critical
        }
    }

    /// Legend color used by the render surface
    pub fn color(&self) -> &'static str {
        match self {
            HealthBand::Excellent => "#22c55e",
            HealthBand::Good => "#84cc16",
            HealthBand::Moderate => "#eab308",
            HealthBand::Poor => "#f97316",
            HealthBand::Critical => "#ef4444",
        }
    }
}

impl Record {
    /// Difference between the recent and previous health readings
    pub fn health_change(&self) -> f64 {
        self.recent_health - self.previous_health
    }

    pub fn health_band(&self) -> HealthBand {
        HealthBand::classify(self.recent_health)
    }

    /// Decode a wire feature, resolving the property aliases the backends emit.
    ///
    /// Returns `None` when no identifier can be found.
    pub fn from_feature(feature: &Feature) -> Option<Self> {
        let props = &feature.properties;
        let id = prop_str(props, &["farm_id", "id"])?;

        Some(Self {
            name: prop_str(props, &["Farmer_Name", "name"]).unwrap_or_else(|| id.clone()),
            region: prop_str(props, &["Vill_Name", "village"]).unwrap_or_default(),
            area: prop_f64(props, &["Area", "area"]),
            recent_health: prop_f64(props, &["recent_ndvi", "recentNDVI"]),
            previous_health: prop_f64(props, &["prev_ndvi", "prevNDVI"]),
            ready: prop_f64(props, &["harvest_flag", "harvest"]) != 0.0,
            boundary: feature.outer_ring().into_iter().map(|[lng, lat]| [lat, lng]).collect(),
            id,
        })
    }
}

/// First non-empty string-like property among `keys`
fn prop_str(props: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match props.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First non-zero numeric property among `keys`, zero when none is present
fn prop_f64(props: &Map<String, Value>, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|key| {
            let value = match props.get(*key)? {
                Value::Number(n) => n.as_f64(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            (value != 0.0 && value.is_finite()).then_some(value)
        })
        .unwrap_or(0.0)
}

/// GeoJSON-like feature as returned by the paged record endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub geometry: Option<Geometry>,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Feature geometry; coordinates are kept loosely typed so both polygon
/// and multi-polygon rings decode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub coordinates: Value,
}

impl Feature {
    /// Outer ring as `[lng, lat]` pairs, empty when the geometry is missing
    pub fn outer_ring(&self) -> Vec<[f64; 2]> {
        let Some(geometry) = &self.geometry else {
            return Vec::new();
        };

        let ring = match geometry.kind.as_str() {
            "MultiPolygon" => geometry.coordinates.get(0).and_then(|poly| poly.get(0)),
            _ => geometry.coordinates.get(0),
        };

        ring.and_then(Value::as_array)
            .map(|points| {
                points
                    .iter()
                    .filter_map(|point| {
                        let lng = point.get(0)?.as_f64()?;
                        let lat = point.get(1)?.as_f64()?;
                        Some([lng, lat])
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Value of the region property, if any
    pub fn region(&self) -> Option<String> {
        prop_str(&self.properties, &["Vill_Name", "village"])
    }
}

/// Metadata attached to a page of features
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(default)]
    pub total_pages: Option<u32>,

    #[serde(default)]
    pub total: Option<u64>,
}

/// One page of features
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturePage {
    #[serde(default)]
    pub features: Vec<Feature>,

    #[serde(default)]
    pub metadata: PageMetadata,
}

impl FeaturePage {
    /// Total page count reported by the server; a missing value means one page
    pub fn total_pages(&self) -> u32 {
        self.metadata.total_pages.unwrap_or(1).max(1)
    }

    /// Decode every feature, skipping those without an identifier
    pub fn to_records(&self) -> Vec<Record> {
        self.features
            .iter()
            .filter_map(|feature| {
                let record = Record::from_feature(feature);
                if record.is_none() {
                    warn!("Skipping feature without an id");
                }
                record
            })
            .collect()
    }
}
