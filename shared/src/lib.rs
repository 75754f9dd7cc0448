pub mod api;
pub mod geo;

pub use api::*;
pub use geo::{EARTH_RADIUS_M, GeoPoint, haversine_distance_m};
