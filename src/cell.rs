//! Spherical cell geometry.
//!
//! Thin wrappers around the `s2` cell library. S2 decomposes the unit
//! sphere into a Hilbert-curve-ordered quadtree over six cube faces: level
//! 0 is a face, level 30 resolves to sub-centimetre cells. Every `s2` call
//! the crate makes lives in this module; the rest of the code treats
//! [`CellID`] as an opaque 64-bit identifier with a `parent`/`level`
//! algebra and an ordering-consistent distance to a query point.

use s2::cell::Cell;
use s2::cellid::{CellID, MAX_LEVEL};
use s2::latlng::LatLng;
use s2::point::Point;

/// Lowest usable tree depth.
pub const MIN_PRECISION: i32 = 0;

/// Finest S2 cell level.
pub const MAX_PRECISION: i32 = MAX_LEVEL as i32;

/// Leaf capacity before an adaptive split.
pub const MAX_VALUES_PER_CELL: usize = 8;

/// Mean Earth radius, used by the kilometre helpers.
pub const EARTH_RADIUS_KM: f64 = 6371.01;

/// Cell containing `(lat, lng)` at the finest level.
pub(crate) fn cell_at(lat: f64, lng: f64) -> CellID {
    CellID::from(LatLng::from_degrees(lat, lng))
}

/// Ancestor of `cell` at `level`.
pub(crate) fn parent(cell: CellID, level: u64) -> CellID {
    cell.parent(level)
}

/// Level (depth) of `cell`: 0 is a cube face, 30 the finest cell.
pub(crate) fn level(cell: CellID) -> u64 {
    cell.level()
}

/// Unit-vector representation of `(lat, lng)`.
pub(crate) fn point(lat: f64, lng: f64) -> Point {
    Point::from(LatLng::from_degrees(lat, lng))
}

/// Minimum squared-chord distance from `cell` to `point`.
///
/// Zero when the point lies inside the cell, strictly positive and
/// monotone in true angular distance outside it. Only the ordering is
/// load-bearing for the search.
pub(crate) fn distance(cell: CellID, point: &Point) -> f64 {
    Cell::from(&cell).distance(point).0
}

/// Centroid of `cell` as a lng/lat display point.
pub(crate) fn lat_lng(cell: CellID) -> geo::Point {
    let center = LatLng::from(cell);
    geo::Point::new(center.lng.deg(), center.lat.deg())
}

/// Great-circle distance in kilometres from the centroid of `cell` to
/// `(lat, lng)`.
pub(crate) fn centroid_distance_km(cell: CellID, lat: f64, lng: f64) -> f64 {
    let angle = LatLng::from_degrees(lat, lng).distance(&LatLng::from(cell));
    angle.rad() * EARTH_RADIUS_KM
}

/// Validates geographic coordinates at the API boundary.
///
/// Out-of-range input is a caller bug, not a runtime condition, so this
/// panics with a diagnostic rather than returning an error.
pub(crate) fn validate_lat_lng(lat: f64, lng: f64) {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        panic!(
            "invalid latitude {lat:.6} (Min:-90, Max 90) or longitude {lng:.6} (Min: -180, Max 180)"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_at_is_deterministic_and_leaf_level() {
        let a = cell_at(48.8566, 2.3522);
        let b = cell_at(48.8566, 2.3522);
        assert_eq!(a, b);
        assert!(a.is_valid());
        assert_eq!(a.level(), MAX_LEVEL);
    }

    #[test]
    fn test_parent_algebra() {
        let leaf = cell_at(51.0504, 13.7373);
        for level in 0..=MAX_LEVEL {
            let ancestor = parent(leaf, level);
            assert_eq!(ancestor.level(), level);
            // An ancestor's ancestor is the same cell as going up directly.
            if level > 0 {
                assert_eq!(parent(ancestor, level - 1), parent(leaf, level - 1));
            }
        }
    }

    #[test]
    fn test_distance_zero_inside_positive_outside() {
        let focus = point(51.0504, 13.7373);
        let containing = parent(cell_at(51.0504, 13.7373), 10);
        assert_eq!(distance(containing, &focus), 0.0);

        let far = parent(cell_at(-33.8688, 151.2093), 10);
        assert!(distance(far, &focus) > 0.0);
    }

    #[test]
    fn test_distance_orders_by_angular_distance() {
        let focus = point(30.0, 10.0);
        let near = parent(cell_at(32.0, 11.0), 12);
        let farther = parent(cell_at(45.0, 30.0), 12);
        let farthest = parent(cell_at(-60.0, -120.0), 12);

        let d_near = distance(near, &focus);
        let d_farther = distance(farther, &focus);
        let d_farthest = distance(farthest, &focus);
        assert!(d_near < d_farther);
        assert!(d_farther < d_farthest);
    }

    #[test]
    fn test_lat_lng_roundtrip_close() {
        let cell = cell_at(40.7128, -74.0060);
        let center = lat_lng(cell);
        // Leaf cells are sub-centimetre; the centroid is effectively the
        // input coordinate.
        assert!((center.y() - 40.7128).abs() < 1e-6);
        assert!((center.x() - (-74.0060)).abs() < 1e-6);
    }

    #[test]
    fn test_centroid_distance_km() {
        // Dresden to Berlin is roughly 165 km.
        let dresden = cell_at(51.0504, 13.7373);
        let km = centroid_distance_km(dresden, 52.5200, 13.4050);
        assert!((km - 165.0).abs() < 10.0, "got {} km", km);
    }

    #[test]
    fn test_validate_accepts_boundaries() {
        validate_lat_lng(90.0, 0.0);
        validate_lat_lng(-90.0, 0.0);
        validate_lat_lng(0.0, 180.0);
        validate_lat_lng(0.0, -180.0);
    }

    #[test]
    #[should_panic(
        expected = "invalid latitude 0.000000 (Min:-90, Max 90) or longitude 181.000000 (Min: -180, Max 180)"
    )]
    fn test_validate_rejects_longitude_east() {
        validate_lat_lng(0.0, 181.0);
    }

    #[test]
    #[should_panic(
        expected = "invalid latitude 91.000000 (Min:-90, Max 90) or longitude 0.000000 (Min: -180, Max 180)"
    )]
    fn test_validate_rejects_latitude_north() {
        validate_lat_lng(91.0, 0.0);
    }
}
