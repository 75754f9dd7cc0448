use waymark_shared::{GeoPoint, haversine_distance_m};

/// Minimum movement before a fix is worth persisting remotely.
pub const SIGNIFICANT_MOVE_M: f64 = 5.0;

/// Whether `next` has moved far enough from the last persisted point to be
/// saved. The first fix ever is always significant.
pub fn should_save(last_saved: Option<&GeoPoint>, next: GeoPoint) -> bool {
    match last_saved {
        None => true,
        Some(prev) => haversine_distance_m(*prev, next) > SIGNIFICANT_MOVE_M,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fix_is_always_significant() {
        assert!(should_save(None, GeoPoint::new(37.0, -122.0)));
    }

    #[test]
    fn standing_still_is_not_significant() {
        let p = GeoPoint::new(37.0, -122.0);
        assert!(!should_save(Some(&p), p));
    }

    #[test]
    fn a_meter_of_drift_is_not_significant() {
        let saved = GeoPoint::new(37.0, -122.0);
        let next = GeoPoint::new(37.00001, -122.0);
        assert!(!should_save(Some(&saved), next));
    }

    #[test]
    fn a_hundred_meters_is_significant() {
        let saved = GeoPoint::new(37.0, -122.0);
        let next = GeoPoint::new(37.001, -122.0);
        assert!(should_save(Some(&saved), next));
    }

    #[test]
    fn threshold_is_strict() {
        // ~4.4m north: inside the 5m radius, stays unsaved.
        let saved = GeoPoint::new(37.0, -122.0);
        let inside = GeoPoint::new(37.00004, -122.0);
        assert!(!should_save(Some(&saved), inside));

        // ~6.7m north: beyond the radius.
        let outside = GeoPoint::new(37.00006, -122.0);
        assert!(should_save(Some(&saved), outside));
    }

    #[test]
    fn baseline_advances_with_the_walk() {
        // Walking scenario: P1 saved, P2 ~1.1m away skipped, P3 ~111m saved.
        let p1 = GeoPoint::new(37.0, -122.0);
        let p2 = GeoPoint::new(37.00001, -122.0);
        let p3 = GeoPoint::new(37.001, -122.0);

        let mut last_saved: Option<GeoPoint> = None;
        assert!(should_save(last_saved.as_ref(), p1));
        last_saved = Some(p1);

        assert!(!should_save(last_saved.as_ref(), p2));

        assert!(should_save(last_saved.as_ref(), p3));
        last_saved = Some(p3);
        assert_eq!(last_saved, Some(p3));
    }
}
