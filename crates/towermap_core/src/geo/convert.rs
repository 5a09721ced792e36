//! Coordinate system normalization.
//!
//! # Responsibility
//! - Convert raw source coordinates into WGS84 decimal degrees.
//! - Reject malformed or out-of-domain input with typed errors, never panics.
//!
//! # Invariants
//! - Every returned point is within [-90, 90] x [-180, 180].
//! - Conversion is pure: no storage access, no global state.

use crate::geo::GeoPoint;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// `41N2430` style: degrees, hemisphere letter, two-digit minutes, two-digit
/// seconds.
static COMPACT_DMS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)([NSEW])(\d{2})(\d{2})$").expect("valid dms regex"));

// GRS80 ellipsoid, ETRS89 / UTM zone 33N (EPSG:25833).
const GRS80_A: f64 = 6_378_137.0;
const GRS80_F: f64 = 1.0 / 298.257_222_101;
const UTM_SCALE: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM33_CENTRAL_MERIDIAN_DEG: f64 = 15.0;

/// Source-declared coordinate reference of a raw pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordSystem {
    /// Decimal degrees, comma decimal separators tolerated.
    Wgs84Decimal,
    /// Compact degrees/hemisphere/minutes/seconds text.
    CompactDms,
    /// ETRS89 / UTM zone 33N planar meters.
    EtrsUtm33,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConvertError {
    MalformedNumber(String),
    MalformedDms(String),
    ProjectionOutOfDomain { easting: f64, northing: f64 },
    OutOfRange { lat: f64, lng: f64 },
}

impl Display for ConvertError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedNumber(raw) => write!(f, "malformed decimal value `{raw}`"),
            Self::MalformedDms(raw) => write!(f, "malformed compact DMS value `{raw}`"),
            Self::ProjectionOutOfDomain { easting, northing } => write!(
                f,
                "planar pair ({easting}, {northing}) outside the usable UTM band"
            ),
            Self::OutOfRange { lat, lng } => {
                write!(f, "converted position ({lat}, {lng}) outside geographic range")
            }
        }
    }
}

impl Error for ConvertError {}

/// Normalizes one raw coordinate pair into WGS84 decimal degrees.
///
/// `raw_x` is the east axis (longitude or easting) and `raw_y` the north
/// axis (latitude or northing), matching the x/y order projected sources
/// publish.
///
/// For `EtrsUtm33` input that already falls within geographic range the
/// pair is accepted as-is (lat = y, lng = x). Some upstream exports mix
/// already-converted rows into projected files; a genuine planar pair that
/// small would sit far outside the usable zone anyway.
pub fn normalize(system: CoordSystem, raw_x: &str, raw_y: &str) -> Result<GeoPoint, ConvertError> {
    let point = match system {
        CoordSystem::Wgs84Decimal => {
            GeoPoint::new(parse_decimal(raw_y)?, parse_decimal(raw_x)?)
        }
        CoordSystem::CompactDms => {
            GeoPoint::new(parse_compact_dms(raw_y)?, parse_compact_dms(raw_x)?)
        }
        CoordSystem::EtrsUtm33 => {
            let x = parse_decimal(raw_x)?;
            let y = parse_decimal(raw_y)?;
            if x.abs() <= 180.0 && y.abs() <= 90.0 {
                debug!(
                    "event=coord_passthrough module=geo status=ok x={} y={}",
                    x, y
                );
                GeoPoint::new(y, x)
            } else {
                utm33_inverse(x, y)?
            }
        }
    };

    if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
        return Err(ConvertError::OutOfRange {
            lat: point.lat,
            lng: point.lng,
        });
    }
    Ok(point)
}

/// Parses decimal text, tolerating a comma as the decimal separator.
pub fn parse_decimal(text: &str) -> Result<f64, ConvertError> {
    let trimmed = text.trim().replace(',', ".");
    let value: f64 = trimmed
        .parse()
        .map_err(|_| ConvertError::MalformedNumber(text.to_string()))?;
    if !value.is_finite() {
        return Err(ConvertError::MalformedNumber(text.to_string()));
    }
    Ok(value)
}

/// Parses one compact DMS axis value, e.g. `41N2430` -> 41.408333.
///
/// The hemisphere letter carries the sign: `S` and `W` negate.
pub fn parse_compact_dms(text: &str) -> Result<f64, ConvertError> {
    let trimmed = text.trim();
    let captures = COMPACT_DMS_RE
        .captures(trimmed)
        .ok_or_else(|| ConvertError::MalformedDms(text.to_string()))?;

    let degrees: f64 = captures[1]
        .parse()
        .map_err(|_| ConvertError::MalformedDms(text.to_string()))?;
    let minutes: f64 = captures[3]
        .parse()
        .map_err(|_| ConvertError::MalformedDms(text.to_string()))?;
    let seconds: f64 = captures[4]
        .parse()
        .map_err(|_| ConvertError::MalformedDms(text.to_string()))?;

    let sign = match captures[2].chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('S') | Some('W') => -1.0,
        _ => 1.0,
    };

    Ok(sign * (degrees + minutes / 60.0 + seconds / 3600.0))
}

/// Inverse transverse Mercator for ETRS89 / UTM zone 33N.
///
/// Standard series expansion on the GRS80 ellipsoid; in-zone accuracy is
/// well below the meter-scale radii this crate works with.
pub fn utm33_inverse(easting: f64, northing: f64) -> Result<GeoPoint, ConvertError> {
    let in_band = easting.is_finite()
        && northing.is_finite()
        && easting > 0.0
        && easting < 1_000_000.0
        && northing >= 0.0
        && northing < 10_000_000.0;
    if !in_band {
        return Err(ConvertError::ProjectionOutOfDomain { easting, northing });
    }

    let e2 = GRS80_F * (2.0 - GRS80_F);
    let ep2 = e2 / (1.0 - e2);

    let m = northing / UTM_SCALE;
    let mu = m / (GRS80_A * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));
    let sqrt_one_minus_e2 = (1.0 - e2).sqrt();
    let e1 = (1.0 - sqrt_one_minus_e2) / (1.0 + sqrt_one_minus_e2);

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin1 = phi1.sin();
    let cos1 = phi1.cos();
    let tan1 = phi1.tan();
    let c1 = ep2 * cos1 * cos1;
    let t1 = tan1 * tan1;
    let n1 = GRS80_A / (1.0 - e2 * sin1 * sin1).sqrt();
    let r1 = GRS80_A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = (easting - UTM_FALSE_EASTING) / (n1 * UTM_SCALE);

    let lat_rad = phi1
        - (n1 * tan1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lng_rad = UTM33_CENTRAL_MERIDIAN_DEG.to_radians()
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

    Ok(GeoPoint::new(lat_rad.to_degrees(), lng_rad.to_degrees()))
}

#[cfg(test)]
mod tests {
    use super::{normalize, parse_compact_dms, parse_decimal, ConvertError, CoordSystem};
    use crate::geo::{haversine_m, GeoPoint};

    #[test]
    fn parse_decimal_accepts_comma_separator() {
        assert_eq!(parse_decimal(" 45,1235 ").unwrap(), 45.1235);
        assert_eq!(parse_decimal("11.25").unwrap(), 11.25);
        assert!(matches!(
            parse_decimal("n/a"),
            Err(ConvertError::MalformedNumber(_))
        ));
    }

    #[test]
    fn compact_dms_parses_all_hemispheres() {
        let lat = parse_compact_dms("41N2430").unwrap();
        assert!((lat - (41.0 + 24.0 / 60.0 + 30.0 / 3600.0)).abs() < 1e-12);

        let lng = parse_compact_dms("12e3015").unwrap();
        assert!((lng - (12.0 + 30.0 / 60.0 + 15.0 / 3600.0)).abs() < 1e-12);

        assert!(parse_compact_dms("33S1200").unwrap() < 0.0);
        assert!(parse_compact_dms("7W0000").unwrap() < 0.0);
    }

    #[test]
    fn compact_dms_rejects_malformed_text() {
        for raw in ["", "41X2430", "41N243", "41.5N2430", "N2430"] {
            assert!(matches!(
                parse_compact_dms(raw),
                Err(ConvertError::MalformedDms(_))
            ));
        }
    }

    #[test]
    fn utm33_inverse_matches_reference_point_within_one_meter() {
        // ETRS89 / UTM 33N reference pair cross-checked against the forward
        // projection.
        let point = normalize(CoordSystem::EtrsUtm33, "360000", "5102000").unwrap();
        let reference = GeoPoint::new(46.057_242_75, 13.190_091_31);
        assert!(haversine_m(point, reference) < 1.0);
    }

    #[test]
    fn utm33_input_already_geographic_passes_through() {
        let point = normalize(CoordSystem::EtrsUtm33, "13,2345", "46,0651").unwrap();
        assert_eq!(point.lat, 46.0651);
        assert_eq!(point.lng, 13.2345);
    }

    #[test]
    fn utm33_rejects_out_of_band_pairs() {
        for (x, y) in [("-5", "5102000"), ("360000", "-1"), ("2000000", "5102000")] {
            assert!(matches!(
                normalize(CoordSystem::EtrsUtm33, x, y),
                Err(ConvertError::ProjectionOutOfDomain { .. })
            ));
        }
        assert!(normalize(CoordSystem::EtrsUtm33, "abc", "5102000").is_err());
    }

    #[test]
    fn normalize_rejects_out_of_range_decimal_pairs() {
        assert!(matches!(
            normalize(CoordSystem::Wgs84Decimal, "11.0", "95.0"),
            Err(ConvertError::OutOfRange { .. })
        ));
        assert!(matches!(
            normalize(CoordSystem::Wgs84Decimal, "181.0", "45.0"),
            Err(ConvertError::OutOfRange { .. })
        ));
    }

    #[test]
    fn normalize_orders_axes_latitude_first() {
        let point = normalize(CoordSystem::Wgs84Decimal, "9.19", "45.4642").unwrap();
        assert_eq!(point.lat, 45.4642);
        assert_eq!(point.lng, 9.19);
    }
}
