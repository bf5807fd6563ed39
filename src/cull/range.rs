// src/cull/range.rs
//! Angular range culler: pure distance ranking around a center point, used
//! for proximity overlays where feature counts are small. No grid binning and
//! no hash dedup — input is assumed already deduplicated upstream.

use crate::types::{GeoPoint, PhotoRecord};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Keep photos within `radius_m` of `center`, up to `max_photos`, ranked by
/// ascending distance with stable ties.
pub fn cull_in_range(
    photos: &[PhotoRecord],
    center: &GeoPoint,
    radius_m: f64,
    max_photos: usize,
) -> Vec<PhotoRecord> {
    if photos.is_empty() || max_photos == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<(f64, &PhotoRecord)> = photos
        .iter()
        .map(|p| (haversine_m(center, &p.coord), p))
        .filter(|(d, _)| *d <= radius_m)
        .collect();
    // Stable sort keeps input order on equal distances.
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    ranked.into_iter().take(max_photos).map(|(_, p)| p.clone()).collect()
}
