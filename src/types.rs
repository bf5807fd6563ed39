// src/types.rs
// Shared geo and photo types; wire format is camelCase JSON to match the
// mobile frontend.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Map viewport rectangle. Valid bounds satisfy
/// `top_left.lat > bottom_right.lat` and `top_left.lng < bottom_right.lng`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub top_left: GeoPoint,
    pub bottom_right: GeoPoint,
}

impl Bounds {
    pub fn is_valid(&self) -> bool {
        self.top_left.lat > self.bottom_right.lat && self.top_left.lng < self.bottom_right.lng
    }

    pub fn lat_range(&self) -> f64 {
        self.top_left.lat - self.bottom_right.lat
    }

    pub fn lng_range(&self) -> f64 {
        self.bottom_right.lng - self.top_left.lng
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.lat <= self.top_left.lat
            && p.lat >= self.bottom_right.lat
            && p.lng >= self.top_left.lng
            && p.lng <= self.bottom_right.lng
    }

    /// Containment test for cache reuse: `self` (the requested box) must lie
    /// entirely within `cached`. Conservative on every edge; any violation
    /// invalidates reuse.
    pub fn is_within(&self, cached: &Bounds) -> bool {
        self.top_left.lat <= cached.top_left.lat
            && self.top_left.lng >= cached.top_left.lng
            && self.bottom_right.lat >= cached.bottom_right.lat
            && self.bottom_right.lng <= cached.bottom_right.lng
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Device,
    Stream,
}

/// One configured photo origin. `priority_rank` is a total order, lower value
/// = higher precedence; it decides cell-slot contention and source ordering
/// in grid culling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub id: String,
    pub kind: SourceKind,
    pub enabled: bool,
    pub priority_rank: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

/// Immutable photo marker. `content_hash` is the dedup identity used by the
/// grid culler; loaders that cannot produce one leave it `None` and the photo
/// never dedups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: String,
    pub source_id: String,
    pub coord: GeoPoint,
    pub bearing: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    pub content_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(tl_lat: f64, tl_lng: f64, br_lat: f64, br_lng: f64) -> Bounds {
        Bounds {
            top_left: GeoPoint { lat: tl_lat, lng: tl_lng },
            bottom_right: GeoPoint { lat: br_lat, lng: br_lng },
        }
    }

    #[test]
    fn containment_is_reflexive() {
        let b = bounds(50.0, 14.0, 49.0, 15.0);
        assert!(b.is_within(&b));
    }

    #[test]
    fn strictly_larger_request_fails_containment() {
        let cached = bounds(50.0, 14.0, 49.0, 15.0);
        let req = bounds(50.1, 13.9, 48.9, 15.1);
        assert!(!req.is_within(&cached));
        // and the other direction still holds
        let sub = bounds(49.9, 14.1, 49.1, 14.9);
        assert!(sub.is_within(&cached));
    }

    #[test]
    fn point_containment_uses_closed_edges() {
        let b = bounds(50.0, 14.0, 49.0, 15.0);
        assert!(b.contains(&GeoPoint { lat: 50.0, lng: 14.0 }));
        assert!(b.contains(&GeoPoint { lat: 49.0, lng: 15.0 }));
        assert!(!b.contains(&GeoPoint { lat: 50.01, lng: 14.5 }));
        assert!(!b.contains(&GeoPoint { lat: 49.5, lng: 13.99 }));
    }
}
