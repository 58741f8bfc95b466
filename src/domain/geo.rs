//! Great-circle distance helpers
//!
//! Hazard radii are tens of metres to a few kilometres, so planar
//! approximations on raw degrees are not good enough. Everything here works
//! on WGS-84 latitude/longitude in degrees and returns metres.

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Metres per degree of latitude (close enough for bounding-box rejection)
const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Haversine great-circle distance in metres between two lat/lng pairs.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat * 0.5).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng * 0.5).sin().powi(2);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Cheap rejection test: is `(lat, lng)` inside a box that fully contains the
/// circle of `radius_m` around `(center_lat, center_lng)`?
///
/// Never returns false for a point that the haversine check would accept.
/// Near the poles the longitude span blows up, so only latitude is checked.
#[inline]
pub fn within_bbox(center_lat: f64, center_lng: f64, lat: f64, lng: f64, radius_m: f64) -> bool {
    // 10% slack covers the spherical vs. flat-box mismatch
    let half_lat = radius_m * 1.1 / METERS_PER_DEG_LAT;
    if (lat - center_lat).abs() > half_lat {
        return false;
    }

    let cos_lat = center_lat.to_radians().cos();
    if cos_lat < 0.01 {
        return true;
    }

    let half_lng = half_lat / cos_lat;
    let mut d_lng = (lng - center_lng).abs();
    if d_lng > 180.0 {
        d_lng = 360.0 - d_lng;
    }
    d_lng <= half_lng
}

/// Valid WGS-84 coordinate (finite, lat in [-90, 90], lng in [-180, 180])
#[inline]
pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        assert_eq!(haversine_m(13.0827, 80.2707, 13.0827, 80.2707), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // One degree of latitude is roughly 111.2 km on the mean sphere
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn test_short_distance_chennai() {
        // ~0.0005 deg north is ~55.6 m
        let d = haversine_m(13.0827, 80.2707, 13.0832, 80.2707);
        assert!((d - 55.6).abs() < 0.5, "got {d}");
    }

    #[test]
    fn test_symmetric() {
        let a = haversine_m(13.07, 80.24, 13.1, 80.28);
        let b = haversine_m(13.1, 80.28, 13.07, 80.24);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_never_rejects_inside_point() {
        let (clat, clng) = (13.0827, 80.2707);
        for (lat, lng) in [(13.0831, 80.2707), (13.0827, 80.2711), (13.0830, 80.2710)] {
            let d = haversine_m(clat, clng, lat, lng);
            assert!(within_bbox(clat, clng, lat, lng, d + 0.1));
        }
    }

    #[test]
    fn test_bbox_rejects_far_point() {
        assert!(!within_bbox(13.0827, 80.2707, 13.1, 80.28, 100.0));
    }

    #[test]
    fn test_bbox_antimeridian() {
        assert!(within_bbox(0.0, 179.9999, 0.0, -179.9999, 100.0));
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(is_valid_coordinate(13.0, 80.0));
        assert!(!is_valid_coordinate(91.0, 0.0));
        assert!(!is_valid_coordinate(0.0, 181.0));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
    }
}
