/// Mean Earth radius used for all distance calculations.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters between two points given in decimal
/// degrees (Haversine). Inputs are not range-checked.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);

    // Rounding can push `a` just past 1 for antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

/// Largest latitude difference, in degrees, that two points `radius_meters`
/// apart can have. Used to narrow nearby scans before the exact check.
pub fn latitude_span_degrees(radius_meters: f64) -> f64 {
    (radius_meters / EARTH_RADIUS_METERS).to_degrees()
}

/// Rounds a distance to two decimal places.
pub fn round_centimeters(meters: f64) -> f64 {
    (meters * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        for (lat, lon) in [(0.0, 0.0), (45.6789, -111.0123), (-89.9, 179.9), (90.0, 0.0)] {
            assert_eq!(haversine_distance(lat, lon, lat, lon), 0.0);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let points = [
            (45.6789, -111.0123),
            (44.4280, -110.5885),
            (-33.8568, 151.2153),
            (51.5007, -0.1246),
        ];
        for &(lat1, lon1) in &points {
            for &(lat2, lon2) in &points {
                let ab = haversine_distance(lat1, lon1, lat2, lon2);
                let ba = haversine_distance(lat2, lon2, lat1, lon1);
                assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
            }
        }
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let d = haversine_distance(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_194.93).abs() < 0.01);
    }

    #[test]
    fn antipodal_points_are_half_circumference() {
        let d = haversine_distance(0.0, 0.0, 0.0, 180.0);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_METERS).abs() < 1.0);
        assert!(!d.is_nan());
    }

    #[test]
    fn latitude_span_bounds_meridian_distance() {
        let span = latitude_span_degrees(1000.0);
        let d = haversine_distance(10.0, 20.0, 10.0 + span, 20.0);
        assert!((d - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_centimeters(12.3456), 12.35);
        assert_eq!(round_centimeters(0.004), 0.0);
    }
}
