//! Great-circle distance and office lookup.

use crate::domain::Office;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two WGS-84 points, in kilometres.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// The office nearest to the given point, considering only offices
/// with both coordinates set. `None` when the ticket has no
/// coordinates or no office qualifies.
pub fn nearest_office<'a>(
    lat: Option<f64>,
    lon: Option<f64>,
    offices: &'a [Office],
) -> Option<&'a Office> {
    let (lat, lon) = (lat?, lon?);

    offices
        .iter()
        .filter_map(|office| {
            office
                .coordinates()
                .map(|(olat, olon)| (office, distance_km(lat, lon, olat, olon)))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(office, _)| office)
}

/// Names of the other offices, ascending by distance from `base`.
/// Offices without coordinates are skipped entirely.
pub fn sorted_offices_by_distance(base: &Office, offices: &[Office]) -> Vec<String> {
    let Some((base_lat, base_lon)) = base.coordinates() else {
        return Vec::new();
    };

    let base_name = base.name.to_lowercase();
    let mut with_distance: Vec<(String, f64)> = offices
        .iter()
        .filter(|office| office.name.to_lowercase() != base_name)
        .filter_map(|office| {
            office
                .coordinates()
                .map(|(lat, lon)| (office.name.clone(), distance_km(base_lat, base_lon, lat, lon)))
        })
        .collect();

    with_distance.sort_by(|a, b| a.1.total_cmp(&b.1));
    with_distance.into_iter().map(|(name, _)| name).collect()
}
