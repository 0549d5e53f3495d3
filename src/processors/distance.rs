//! Great-circle distance between geographic points.

use crate::core::records::GeoPoint;

/// Mean Earth radius in kilometers used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers spanned by one degree of latitude (and of longitude at the
/// equator). Used by the spatial index to convert a kilometer radius into
/// a degree search window.
pub const KM_PER_DEGREE: f64 = 111.32;

/// Haversine great-circle distance in kilometers between two points.
///
/// Symmetric, non-negative, and zero for identical inputs. Any NaN
/// coordinate propagates to a NaN distance, which fails every
/// `<= epsilon` comparison, so degenerate points are simply never
/// neighbors rather than a numeric fault.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}
