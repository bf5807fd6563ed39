// src/cull/grid.rs
//! Grid culler: bins photos into a fixed N×N grid over the viewport,
//! deduplicates by content hash within each cell, then round-robins across
//! cells so every populated cell contributes once before any contributes
//! twice. Source priority decides which photo wins a contested cell slot;
//! round-robin decides visitation order across cells. Output is deterministic
//! for a given priority map regardless of input map iteration order.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::types::{Bounds, PhotoRecord};

pub const GRID_DIM: usize = 10;

struct Cell {
    photos: Vec<PhotoRecord>,
    seen_hashes: HashSet<String>,
}

/// Downsample `photos_by_source` to at most `max_photos`, keeping spatial
/// spread. `source_priority` maps source id to its rank (lower = higher
/// precedence); unknown sources sort last.
pub fn cull(
    photos_by_source: &HashMap<String, Vec<PhotoRecord>>,
    max_photos: usize,
    bounds: &Bounds,
    source_priority: &HashMap<String, i32>,
) -> Vec<PhotoRecord> {
    if photos_by_source.is_empty() || max_photos == 0 {
        return Vec::new();
    }

    // Degenerate bounds collapse the zero-range axis to a single row/column
    // instead of dividing by zero.
    let lat_range = bounds.lat_range();
    let lng_range = bounds.lng_range();
    let rows = if lat_range > 0.0 { GRID_DIM } else { 1 };
    let cols = if lng_range > 0.0 { GRID_DIM } else { 1 };

    // Lower rank inserted first; ties broken by id so the outcome does not
    // depend on HashMap iteration order.
    let mut ordered: Vec<&String> = photos_by_source.keys().collect();
    ordered.sort_by_key(|id| (source_priority.get(*id).copied().unwrap_or(i32::MAX), (*id).clone()));

    let mut cells: BTreeMap<(usize, usize), Cell> = BTreeMap::new();
    for source_id in ordered {
        for photo in &photos_by_source[source_id] {
            // Stray out-of-bounds photos are dropped, not clamped onto an
            // edge cell; loaders already filter by bounds upstream.
            if !bounds.contains(&photo.coord) {
                continue;
            }
            let key = cell_key(&photo.coord, bounds, rows, cols, lat_range, lng_range);
            let cell = cells.entry(key).or_insert_with(|| Cell {
                photos: Vec::new(),
                seen_hashes: HashSet::new(),
            });
            if let Some(hash) = &photo.content_hash {
                // First seen wins within the cell; earlier sources have
                // higher precedence by construction.
                if !cell.seen_hashes.insert(hash.clone()) {
                    continue;
                }
            }
            cell.photos.push(photo.clone());
        }
    }

    round_robin(cells, max_photos)
}

fn cell_key(
    p: &crate::types::GeoPoint,
    bounds: &Bounds,
    rows: usize,
    cols: usize,
    lat_range: f64,
    lng_range: f64,
) -> (usize, usize) {
    let row = if rows == 1 {
        0
    } else {
        let frac = (bounds.top_left.lat - p.lat) / lat_range;
        ((frac * rows as f64).floor() as isize).clamp(0, rows as isize - 1) as usize
    };
    let col = if cols == 1 {
        0
    } else {
        let frac = (p.lng - bounds.top_left.lng) / lng_range;
        ((frac * cols as f64).floor() as isize).clamp(0, cols as isize - 1) as usize
    };
    (row, col)
}

/// One photo per populated cell per round, in stable cell order; exhausted
/// cells drop out of rotation.
fn round_robin(cells: BTreeMap<(usize, usize), Cell>, max_photos: usize) -> Vec<PhotoRecord> {
    let mut lanes: Vec<std::vec::IntoIter<PhotoRecord>> =
        cells.into_values().map(|c| c.photos.into_iter()).collect();
    let mut selected = Vec::with_capacity(max_photos.min(64));

    while !lanes.is_empty() && selected.len() < max_photos {
        let mut exhausted = Vec::new();
        for (i, lane) in lanes.iter_mut().enumerate() {
            match lane.next() {
                Some(photo) => {
                    selected.push(photo);
                    if selected.len() >= max_photos {
                        break;
                    }
                }
                None => exhausted.push(i),
            }
        }
        // Every round either selects at least one photo or removes every
        // exhausted lane, so the loop terminates.
        for i in exhausted.into_iter().rev() {
            lanes.remove(i);
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;

    fn bounds() -> Bounds {
        Bounds {
            top_left: GeoPoint { lat: 50.0, lng: 14.0 },
            bottom_right: GeoPoint { lat: 49.0, lng: 15.0 },
        }
    }

    fn photo(id: &str, source: &str, lat: f64, lng: f64, hash: Option<&str>) -> PhotoRecord {
        PhotoRecord {
            id: id.into(),
            source_id: source.into(),
            coord: GeoPoint { lat, lng },
            bearing: 0.0,
            altitude: None,
            content_ref: format!("ref/{id}"),
            content_hash: hash.map(Into::into),
            captured_at: None,
        }
    }

    #[test]
    fn grid_example_from_northwest_corner() {
        let b = bounds();
        let key = cell_key(&GeoPoint { lat: 49.95, lng: 14.05 }, &b, GRID_DIM, GRID_DIM, b.lat_range(), b.lng_range());
        assert_eq!(key, (0, 0));
    }

    #[test]
    fn empty_input_and_zero_cap_yield_empty() {
        let empty = HashMap::new();
        assert!(cull(&empty, 10, &bounds(), &HashMap::new()).is_empty());

        let mut by_source = HashMap::new();
        by_source.insert("s".to_string(), vec![photo("a", "s", 49.5, 14.5, None)]);
        assert!(cull(&by_source, 0, &bounds(), &HashMap::new()).is_empty());
    }

    #[test]
    fn under_cap_returns_everything_once_deduplicated() {
        let mut by_source = HashMap::new();
        by_source.insert(
            "s".to_string(),
            vec![
                photo("a", "s", 49.95, 14.05, Some("h1")),
                photo("b", "s", 49.95, 14.06, Some("h1")), // same cell, same hash
                photo("c", "s", 49.05, 14.95, Some("h2")),
            ],
        );
        let out = cull(&by_source, 100, &bounds(), &HashMap::new());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn priority_source_wins_contested_cell_slot() {
        let mut by_source = HashMap::new();
        by_source.insert("low".to_string(), vec![photo("l", "low", 49.95, 14.05, Some("h"))]);
        by_source.insert("high".to_string(), vec![photo("h", "high", 49.95, 14.06, Some("h"))]);
        let mut prio = HashMap::new();
        prio.insert("high".to_string(), 0);
        prio.insert("low".to_string(), 5);

        let out = cull(&by_source, 1, &bounds(), &prio);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_id, "high");
    }

    #[test]
    fn degenerate_bounds_use_a_single_cell() {
        let flat = Bounds {
            top_left: GeoPoint { lat: 49.5, lng: 14.0 },
            bottom_right: GeoPoint { lat: 49.5, lng: 15.0 },
        };
        let mut by_source = HashMap::new();
        by_source.insert(
            "s".to_string(),
            vec![photo("a", "s", 49.5, 14.2, None), photo("b", "s", 49.5, 14.8, None)],
        );
        let out = cull(&by_source, 10, &flat, &HashMap::new());
        assert_eq!(out.len(), 2);
        for p in &out {
            assert!(p.coord.lat.is_finite());
        }
    }

    #[test]
    fn out_of_bounds_photos_are_dropped() {
        let mut by_source = HashMap::new();
        by_source.insert("s".to_string(), vec![photo("a", "s", 60.0, 20.0, None)]);
        assert!(cull(&by_source, 10, &bounds(), &HashMap::new()).is_empty());
    }
}
