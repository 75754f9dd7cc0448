use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (spherical approximation).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Great-circle distance between two points in meters (haversine).
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi_a = a.latitude.to_radians();
    let phi_b = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let p = GeoPoint::new(37.0, -122.0);
        assert_eq!(haversine_distance_m(p, p), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint::new(48.8566, 2.3522);
        let b = GeoPoint::new(51.5074, -0.1278);
        let ab = haversine_distance_m(a, b);
        let ba = haversine_distance_m(b, a);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = haversine_distance_m(a, b);
        // pi/180 * R
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn small_latitude_step_is_about_a_meter() {
        let a = GeoPoint::new(37.0, -122.0);
        let b = GeoPoint::new(37.00001, -122.0);
        let d = haversine_distance_m(a, b);
        assert!((1.0..1.3).contains(&d), "got {d}");
    }

    #[test]
    fn larger_latitude_step_is_about_a_hundred_meters() {
        let a = GeoPoint::new(37.0, -122.0);
        let b = GeoPoint::new(37.001, -122.0);
        let d = haversine_distance_m(a, b);
        assert!((110.0..113.0).contains(&d), "got {d}");
    }

    #[test]
    fn longitude_steps_shrink_with_latitude() {
        let equator = haversine_distance_m(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.001));
        let north = haversine_distance_m(GeoPoint::new(60.0, 0.0), GeoPoint::new(60.0, 0.001));
        assert!(north < equator * 0.6, "equator {equator}, north {north}");
    }
}
