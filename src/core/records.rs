//! Core record types for geolocated wildfire data.
//!
//! A [`FireRecord`] is what the CSV loader produces: a coordinate pair plus
//! the incident metadata carried through clustering as an opaque payload.
//! The clustering engines only ever look at the coordinates.

use serde::{Deserialize, Serialize};

/// A point on the globe in WGS84 degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a new point from latitude/longitude in degrees.
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns true if both coordinates are finite numbers.
    ///
    /// Non-finite points are legal inputs but can never be anyone's
    /// neighbor; callers are expected to filter them out up front.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// One wildfire damage inspection record.
///
/// The metadata fields are carried verbatim from the source CSV and are
/// opaque to the clustering engines; only `point` and the validity flags
/// matter to the pipeline itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FireRecord {
    /// Source row identifier.
    pub id: String,
    /// Damage classification (e.g. "Destroyed (>50%)").
    pub damage: String,
    /// Street number of the inspected structure.
    pub street_number: String,
    /// Street name of the inspected structure.
    pub street_name: String,
    /// City name.
    pub city: String,
    /// County name.
    pub county: String,
    /// Fire incident name.
    pub incident_name: String,
    /// Fire incident number.
    pub incident_number: String,
    /// Structure type description.
    pub structure_type: String,
    /// Structure category description.
    pub structure_category: String,
    /// Year the structure was built, as found in the source data.
    pub year_built: String,
    /// Location in WGS84 degrees.
    pub point: GeoPoint,
    /// Set when the latitude column was missing or unparsable.
    pub lat_missing: bool,
    /// Set when the longitude column was missing or unparsable.
    pub lon_missing: bool,
}

impl FireRecord {
    /// Returns true if both coordinates were present, parsed, and finite.
    #[inline]
    pub fn has_valid_coordinates(&self) -> bool {
        !self.lat_missing && !self.lon_missing && self.point.is_finite()
    }
}

/// Terminal per-point state assigned by a clustering run.
///
/// `Unvisited` is the initial state and never survives a completed run;
/// every point ends as either `Noise` or `Cluster(id)` with `id >= 1`.
/// Once a point holds a concrete cluster id it never changes again, while
/// `Noise` may still be reclaimed into a cluster during expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// Not yet examined.
    Unvisited,
    /// Density-unreachable from every core point.
    Noise,
    /// Member of the cluster with this id (ids start at 1).
    Cluster(u32),
}

impl Label {
    /// Returns the cluster id, or `None` for noise/unvisited.
    #[inline]
    pub fn cluster_id(&self) -> Option<u32> {
        match self {
            Label::Cluster(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns true for `Noise`.
    #[inline]
    pub fn is_noise(&self) -> bool {
        matches!(self, Label::Noise)
    }
}

/// Anything the clustering engines can position on the globe.
///
/// The engines read coordinates through this trait and otherwise treat
/// the record as an opaque payload to be carried into the result.
pub trait SpatialRecord: Clone {
    /// The record's location in WGS84 degrees.
    fn point(&self) -> GeoPoint;
}

impl SpatialRecord for GeoPoint {
    #[inline]
    fn point(&self) -> GeoPoint {
        *self
    }
}

impl SpatialRecord for FireRecord {
    #[inline]
    fn point(&self) -> GeoPoint {
        self.point
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_finite() {
        assert!(GeoPoint::new(34.05, -118.24).is_finite());
        assert!(!GeoPoint::new(f64::NAN, -118.24).is_finite());
        assert!(!GeoPoint::new(34.05, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_record_coordinate_validity() {
        let mut record = FireRecord {
            point: GeoPoint::new(38.5, -122.7),
            ..FireRecord::default()
        };
        assert!(record.has_valid_coordinates());

        record.lat_missing = true;
        assert!(!record.has_valid_coordinates());

        record.lat_missing = false;
        record.point = GeoPoint::new(f64::NAN, -122.7);
        assert!(!record.has_valid_coordinates());
    }

    #[test]
    fn test_label_accessors() {
        assert_eq!(Label::Cluster(3).cluster_id(), Some(3));
        assert_eq!(Label::Noise.cluster_id(), None);
        assert_eq!(Label::Unvisited.cluster_id(), None);
        assert!(Label::Noise.is_noise());
        assert!(!Label::Cluster(1).is_noise());
    }
}
