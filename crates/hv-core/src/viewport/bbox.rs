use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Spatial extent of the visible map region, in `(west, south, east, north)` order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BboxParseError {
    #[error("expected 4 comma-separated values, got {0}")]
    WrongArity(usize),

    #[error("invalid coordinate '{0}'")]
    InvalidNumber(String),
}

impl Bbox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Canonical cache key, identical to the `Display` form
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Finite and not inverted
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Whether a `(lng, lat)` point lies inside, edges included
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        self.min_x <= lng && lng <= self.max_x && self.min_y <= lat && lat <= self.max_y
    }

    /// Smallest bbox enclosing every `[lat, lng]` boundary point.
    ///
    /// Used to fit the map to the seed records; `None` for an empty input.
    pub fn enclosing<'a, I>(boundaries: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a [[f64; 2]]>,
    {
        let mut bounds: Option<Bbox> = None;
        for &[lat, lng] in boundaries.into_iter().flatten() {
            bounds = Some(match bounds {
                None => Bbox::new(lng, lat, lng, lat),
                Some(b) => Bbox::new(
                    b.min_x.min(lng),
                    b.min_y.min(lat),
                    b.max_x.max(lng),
                    b.max_y.max(lat),
                ),
            });
        }
        bounds
    }
}

impl fmt::Display for Bbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

impl FromStr for Bbox {
    type Err = BboxParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::WrongArity(parts.len()));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }

        Ok(Bbox::new(values[0], values[1], values[2], values[3]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trips_through_parse() {
        let bbox: Bbox = "73.1,19.2,73.25,19.4".parse().unwrap();
        assert_eq!(bbox.key(), "73.1,19.2,73.25,19.4");
        assert_eq!(bbox.width(), 73.25 - 73.1);
    }

    #[test]
    fn test_integral_coordinates_print_without_fraction() {
        assert_eq!(Bbox::new(0.0, 0.0, 10.0, 10.0).key(), "0,0,10,10");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("1,2,3".parse::<Bbox>(), Err(BboxParseError::WrongArity(3)));
        assert!(matches!(
            "1,2,x,4".parse::<Bbox>(),
            Err(BboxParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_enclosing_swaps_lat_lng() {
        let a = vec![[19.0, 73.0], [19.5, 73.2]];
        let b = vec![[18.9, 73.4]];
        let bounds = Bbox::enclosing([a.as_slice(), b.as_slice()]).unwrap();
        assert_eq!(bounds, Bbox::new(73.0, 18.9, 73.4, 19.5));
        assert!(Bbox::enclosing(std::iter::empty::<&[[f64; 2]]>()).is_none());
    }
}
