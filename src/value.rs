//! Stored entries.

use s2::cellid::CellID;

use crate::cell;

/// A stored entry: a user payload tagged by an index-wide unique key and
/// located by the finest-level cell of its coordinates.
///
/// The cell is recorded at the maximum level regardless of which tree node
/// currently holds the value, so distances stay exact even when the value
/// sits in a coarse leaf.
#[derive(Debug, Clone)]
pub struct Value<T> {
    key: String,
    payload: T,
    cell: CellID,
}

impl<T> Value<T> {
    pub(crate) fn new(key: String, payload: T, cell: CellID) -> Self {
        Self { key, payload, cell }
    }

    /// Index-wide unique key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Borrowed payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consumes the value, returning its payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Finest-level cell of the value's location.
    pub fn cell(&self) -> CellID {
        self.cell
    }

    /// Stored location as a lng/lat display point.
    pub fn position(&self) -> geo::Point {
        cell::lat_lng(self.cell)
    }

    /// Great-circle distance in kilometres from this value to `(lat, lng)`.
    pub fn distance_km(&self, lat: f64, lng: f64) -> f64 {
        cell::centroid_distance_km(self.cell, lat, lng)
    }

    pub(crate) fn set_payload(&mut self, payload: T) {
        self.payload = payload;
    }

    pub(crate) fn into_parts(self) -> (String, T, CellID) {
        (self.key, self.payload, self.cell)
    }
}
