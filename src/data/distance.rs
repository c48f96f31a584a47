//! Spatial, temporal and textual distances between reports

/// Earth radius in meters used by every spatial distance in the crate
pub const EARTH_RADIUS_METERS: f64 = 6_371.0 * 1000.0;

pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Great-circle distance in meters between two coordinates given in degrees
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat1 - lat2).to_radians();
    let d_lon = (lon1 - lon2).to_radians();
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + (d_lon / 2.0).sin().powi(2) * phi1.cos() * phi2.cos();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Haversine distance truncated to whole meters
pub fn haversine_whole_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> u32 {
    haversine_meters(lat1, lon1, lat2, lon2) as u32
}

/// Absolute difference of two millisecond timestamps in whole days (truncated)
pub fn whole_days_between(millis_a: i64, millis_b: i64) -> u32 {
    let days = (millis_a - millis_b).unsigned_abs() / MILLIS_PER_DAY as u64;
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Edit-distance similarity in [0, 1]; 1 means identical strings
pub fn category_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Case-insensitive category equality
pub fn same_category(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_identical_points() {
        assert_eq!(haversine_whole_meters(52.52, 13.405, 52.52, 13.405), 0);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        // One degree of latitude on a 6371 km sphere
        let d = haversine_meters(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.93).abs() < 1.0, "got {}", d);
        assert_eq!(haversine_meters(1.0, 0.0, 0.0, 0.0), d);
    }

    #[test]
    fn days_are_truncated() {
        assert_eq!(whole_days_between(0, MILLIS_PER_DAY - 1), 0);
        assert_eq!(whole_days_between(3 * MILLIS_PER_DAY + 5, 0), 3);
        assert_eq!(whole_days_between(0, 3 * MILLIS_PER_DAY + 5), 3);
    }

    #[test]
    fn category_similarity_bounds() {
        assert_eq!(category_similarity("pothole", "pothole"), 1.0);
        assert_eq!(category_similarity("", ""), 1.0);
        assert_eq!(category_similarity("abc", "xyz"), 0.0);
        let s = category_similarity("streetlight", "streetlights");
        assert!(s > 0.9 && s < 1.0);
    }

    #[test]
    fn same_category_ignores_case() {
        assert!(same_category("Graffiti", "graffiti"));
        assert!(!same_category("Graffiti", "Litter"));
    }
}
