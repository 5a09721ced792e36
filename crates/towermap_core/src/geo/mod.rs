//! Geodesic distance and proximity pre-filter math.
//!
//! # Responsibility
//! - Great-circle distance between WGS84 points (haversine).
//! - Planar bounding box used to cheapen radius queries before the exact
//!   distance check.
//!
//! # Invariants
//! - All distances are meters on a sphere of radius `EARTH_RADIUS_M`.
//! - `haversine_m` is symmetric and zero at identity.

pub mod convert;

/// Mean Earth radius used by every distance in this crate.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude, also used for longitude after the
/// `cos(lat)` correction.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// One WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance in meters between two points.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Planar degree box enclosing a radius around a center point.
///
/// The box intentionally over-approximates: candidates inside it still go
/// through the exact haversine check. The planar conversion degrades near
/// the poles and does not wrap across the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(center: GeoPoint, radius_m: f64) -> Self {
        let d_lat = radius_m / METERS_PER_DEGREE;
        let d_lng = radius_m / (METERS_PER_DEGREE * center.lat.to_radians().cos());
        Self {
            min_lat: center.lat - d_lat,
            max_lat: center.lat + d_lat,
            min_lng: center.lng - d_lng,
            max_lng: center.lng + d_lng,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }
}
