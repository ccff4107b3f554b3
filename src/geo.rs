//! Geodesic helpers: haversine distance and the bounding-box pre-filter.

/// Mean Earth radius used by the spherical approximation (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Rounded length of one degree of latitude (meters).
///
/// Slightly shorter than the true ~111.2 km, so boxes err on the large side.
pub const METERS_PER_DEGREE_LAT: f64 = 111_000.0;

/// Great-circle distance in meters between two WGS84 points.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] for antipodal points.
    let a = a.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Axis-aligned latitude/longitude range used as a cheap candidate filter.
///
/// When `lon_min > lon_max` the box crosses the antimeridian and covers
/// `[lon_min, 180] ∪ [-180, lon_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Box around a point, sized to `radius_m * margin`.
    ///
    /// The longitude half-span is widened by `1 / cos(lat)` at the poleward
    /// edge of the box, and covers the full circle once the box touches a
    /// pole.
    pub fn around(lat: f64, lon: f64, radius_m: f64, margin: f64) -> Self {
        let lat_half = radius_m * margin / METERS_PER_DEGREE_LAT;
        let lat_min = (lat - lat_half).max(-90.0);
        let lat_max = (lat + lat_half).min(90.0);

        let full = Self {
            lat_min,
            lat_max,
            lon_min: -180.0,
            lon_max: 180.0,
        };
        if lat_min <= -90.0 || lat_max >= 90.0 {
            return full;
        }

        let poleward = lat_min.abs().max(lat_max.abs());
        let lon_half = lat_half / poleward.to_radians().cos();
        if !lon_half.is_finite() || lon_half >= 180.0 {
            return full;
        }

        let mut lon_min = lon - lon_half;
        let mut lon_max = lon + lon_half;
        if lon_min < -180.0 {
            lon_min += 360.0;
        }
        if lon_max > 180.0 {
            lon_max -= 360.0;
        }

        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    pub fn wraps_antimeridian(&self) -> bool {
        self.lon_min > self.lon_max
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if lat < self.lat_min || lat > self.lat_max {
            return false;
        }
        if self.wraps_antimeridian() {
            lon >= self.lon_min || lon <= self.lon_max
        } else {
            lon >= self.lon_min && lon <= self.lon_max
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_zero_distance_to_self() {
        assert_eq!(haversine_m(44.0, 10.0, 44.0, 10.0), 0.0);
        assert_eq!(haversine_m(-89.9, 179.9, -89.9, 179.9), 0.0);
    }

    #[test]
    fn test_known_distances() {
        // ~7 m diagonal step at 44 N
        let d = haversine_m(44.0, 10.0, 44.00005, 10.00005);
        assert!((6.0..8.0).contains(&d), "got {d}");

        // One degree of latitude on the sphere
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");

        // Antipodes
        let d = haversine_m(0.0, 0.0, 0.0, 180.0);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1e-3);
    }

    #[test]
    fn test_symmetry_and_triangle_inequality() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let mut p = || (rng.gen_range(-89.0..89.0), rng.gen_range(-180.0..180.0));
            let (a, b, c) = (p(), p(), p());
            let ab = haversine_m(a.0, a.1, b.0, b.1);
            let ba = haversine_m(b.0, b.1, a.0, a.1);
            let bc = haversine_m(b.0, b.1, c.0, c.1);
            let ac = haversine_m(a.0, a.1, c.0, c.1);
            assert!((ab - ba).abs() < 1e-6);
            assert!(ac <= ab + bc + 1e-6);
        }
    }

    #[test]
    fn test_box_contains_center() {
        let bb = BoundingBox::around(44.0, 10.0, 20.0, 1.5);
        assert!(bb.contains(44.0, 10.0));
        assert!(!bb.wraps_antimeridian());
        assert!(bb.lat_max - bb.lat_min > 2.0 * 20.0 / METERS_PER_DEGREE_LAT);
    }

    #[test]
    fn test_box_excludes_far_points() {
        let bb = BoundingBox::around(44.0, 10.0, 20.0, 1.5);
        // ~500 m north
        assert!(!bb.contains(44.0045, 10.0));
        // ~500 m east
        assert!(!bb.contains(44.0, 10.0063));
    }

    #[test]
    fn test_box_covers_every_point_within_radius() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let radius = 20.0;
        for _ in 0..2_000 {
            let lat: f64 = rng.gen_range(-85.0..85.0);
            let lon: f64 = rng.gen_range(-180.0..180.0);
            let bb = BoundingBox::around(lat, lon, radius, 1.5);

            // Random point up to ~2x radius away in degree space
            let dlat = rng.gen_range(-0.0004..0.0004);
            let dlon = rng.gen_range(-0.0004..0.0004) / lat.to_radians().cos();
            let plat = (lat + dlat).clamp(-90.0, 90.0);
            let mut plon = lon + dlon;
            if plon > 180.0 {
                plon -= 360.0;
            } else if plon < -180.0 {
                plon += 360.0;
            }

            if haversine_m(lat, lon, plat, plon) <= radius {
                assert!(bb.contains(plat, plon), "({plat},{plon}) missed by {bb:?}");
            }
        }
    }

    #[test]
    fn test_box_wraps_antimeridian() {
        let bb = BoundingBox::around(10.0, 179.9999, 20.0, 1.5);
        assert!(bb.wraps_antimeridian());
        assert!(bb.contains(10.0, -179.9999));
        assert!(bb.contains(10.0, 179.9999));
        assert!(!bb.contains(10.0, 0.0));
    }

    #[test]
    fn test_box_near_pole_covers_all_longitudes() {
        let bb = BoundingBox::around(89.9999, 0.0, 20.0, 1.5);
        assert_eq!(bb.lat_max, 90.0);
        assert_eq!((bb.lon_min, bb.lon_max), (-180.0, 180.0));
        assert!(bb.contains(89.9999, 120.0));
    }
}
