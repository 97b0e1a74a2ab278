//! Geographic routing: address geocoding and office distance lookup.

pub mod distance;
pub mod geocoder;

pub use distance::{distance_km, nearest_office, sorted_offices_by_distance};
pub use geocoder::{GeoProvider, GeocodeFetch, HttpGeocodeFetch};
