//! The KNN index façade.
//!
//! [`Knn`] owns the cell tree, a key-to-node lookup map for O(1) removal,
//! and the index-wide prune lock. Searches are best-first traversals over
//! a min-priority queue keyed by cell-to-point distance: because a cell is
//! never farther from the query point than anything inside it, the first
//! value popped is the globally nearest, the second the next-nearest, and
//! so on.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use s2::cellid::CellID;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cell::{self, MAX_PRECISION, MIN_PRECISION};
use crate::error::{KnnError, Result};
use crate::node::{Expansion, Node};
use crate::value::Value;

/// In-memory spherical k-nearest-neighbor index.
///
/// Values are arbitrary payloads tagged by a unique string key and located
/// by latitude/longitude. [`search`](Knn::search) streams stored values
/// through a callback in order of increasing spherical distance from a
/// focal point.
///
/// # Examples
///
/// ```rust
/// use geoknn::{CancellationToken, Knn};
///
/// let index = Knn::new(14)?;
/// index.add_value("dresden", 1, 51.0504, 13.7373);
/// index.add_value("karakum", 2, 40.7128, 74.0060);
/// index.add_value("origin", 3, 0.0, 0.0);
///
/// let mut nearest = Vec::new();
/// index.search(&CancellationToken::new(), 30.123, 10.123, |value| {
///     nearest.push(*value.payload());
///     nearest.len() >= 2
/// });
/// assert_eq!(nearest, vec![1, 3]);
/// # Ok::<(), geoknn::KnnError>(())
/// ```
///
/// # Concurrency
///
/// All operations take `&self`; the index can be shared across threads
/// (e.g. behind an `Arc`). Inserts into distinct regions run in parallel;
/// searches run concurrently with mutation and observe each popped node as
/// an internally consistent snapshot. [`prune`](Knn::prune) alone takes
/// the tree exclusively.
pub struct Knn<T> {
    root: Arc<Node<T>>,
    precision: u64,
    lookup: RwLock<FxHashMap<String, Arc<Node<T>>>>,
    // Exclusive for prune, shared for everything else, so tree collapse
    // never races a traversal or a mutation.
    prune_lock: RwLock<()>,
}

impl<T> fmt::Debug for Knn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Knn")
            .field("precision", &self.precision)
            .field("values", &self.lookup.read().len())
            .finish()
    }
}

/// Frontier element of the exact search: a subtree still to be expanded or
/// a value ready to be emitted.
enum Frontier<T> {
    Node(Arc<Node<T>>),
    Value(Value<T>),
}

/// Min-heap adapter over the max-heap `BinaryHeap`: orders entries by
/// ascending distance. Ties compare equal and pop in arbitrary heap order.
struct Nearest<E> {
    distance: f64,
    entry: E,
}

impl<E> Nearest<E> {
    fn new(distance: f64, entry: E) -> Self {
        Self { distance, entry }
    }
}

impl<E> PartialEq for Nearest<E> {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl<E> Eq for Nearest<E> {}

impl<E> PartialOrd for Nearest<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Nearest<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// Observational occupancy statistics, see [`Knn::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Values currently stored.
    pub value_count: usize,
    /// Leaves currently holding at least one value.
    pub leaf_count: usize,
    /// Largest number of values in any single leaf.
    pub max_values_per_leaf: usize,
    /// Mean number of values per occupied leaf.
    pub avg_values_per_leaf: f64,
}

impl<T> Knn<T> {
    /// Creates an index whose tree never grows deeper than `precision`
    /// (cell levels 0 through 30).
    ///
    /// # Errors
    ///
    /// Returns [`KnnError::InvalidPrecision`] when `precision` lies outside
    /// `0..=30`.
    pub fn new(precision: i32) -> Result<Self> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return Err(KnnError::InvalidPrecision(precision));
        }
        Ok(Self {
            root: Node::root(precision as u64),
            precision: precision as u64,
            lookup: RwLock::new(FxHashMap::default()),
            prune_lock: RwLock::new(()),
        })
    }

    /// Configured maximum tree depth.
    pub fn precision(&self) -> i32 {
        self.precision as i32
    }

    /// Adds a new value under `id` at `(lat, lng)`.
    ///
    /// `id` must not already be stored; use
    /// [`upsert_value`](Knn::upsert_value) to overwrite. Panics on
    /// out-of-range coordinates (`lat` outside ±90, `lng` outside ±180):
    /// bad coordinates are a caller bug, not a runtime condition.
    pub fn add_value(&self, id: impl Into<String>, payload: T, lat: f64, lng: f64) {
        let _guard = self.prune_lock.read();
        cell::validate_lat_lng(lat, lng);
        self.add_value_locked(id.into(), payload, cell::cell_at(lat, lng));
    }

    fn add_value_locked(&self, id: String, payload: T, target: CellID) {
        let mut moved = Vec::new();
        let node = Node::add_value(&self.root, id.clone(), payload, target, &mut moved);
        let mut lookup = self.lookup.write();
        // Splits relocate resident values into children; refresh their
        // entries first so the freshly placed id wins if it appears twice.
        for (key, relocated) in moved {
            lookup.insert(key, relocated);
        }
        lookup.insert(id, node);
    }

    /// Removes the value stored under `id`.
    ///
    /// Returns `false` when the id is unknown. Emptied branches are left in
    /// place until the next [`prune`](Knn::prune).
    pub fn remove_value(&self, id: &str) -> bool {
        let _guard = self.prune_lock.read();
        self.remove_value_locked(id)
    }

    fn remove_value_locked(&self, id: &str) -> bool {
        let mut lookup = self.lookup.write();
        let Some(node) = lookup.get(id) else {
            return false;
        };
        node.remove_value(id);
        lookup.remove(id);
        true
    }

    /// Inserts `id` or overwrites the stored value.
    ///
    /// When the id exists and its finest-level cell is unchanged, only the
    /// payload is swapped; otherwise the value is removed and re-added at
    /// the new location. Panics on out-of-range coordinates like
    /// [`add_value`](Knn::add_value).
    pub fn upsert_value(&self, id: impl Into<String>, payload: T, lat: f64, lng: f64) {
        let _guard = self.prune_lock.read();
        cell::validate_lat_lng(lat, lng);
        let id = id.into();
        let target = cell::cell_at(lat, lng);

        let node = self.lookup.read().get(&id).cloned();
        let Some(node) = node else {
            self.add_value_locked(id, payload, target);
            return;
        };
        if let Some(payload) = node.update_value(&id, target, payload) {
            // The location changed cells: the tree position is stale.
            self.remove_value_locked(&id);
            self.add_value_locked(id, payload, target);
        }
    }

    /// Membership test for `id`.
    pub fn has_value(&self, id: &str) -> bool {
        let _guard = self.prune_lock.read();
        self.lookup.read().contains_key(id)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        let _guard = self.prune_lock.read();
        self.lookup.read().len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collapses branches emptied by removals.
    ///
    /// Maintenance operation: it is never triggered automatically. Takes
    /// the tree exclusively; every other operation waits for the pass.
    pub fn prune(&self) {
        let _guard = self.prune_lock.write();
        debug!("pruning empty branches");
        self.root.prune();
    }

    /// Current leaf-occupancy statistics. Observational only.
    pub fn stats(&self) -> IndexStats {
        let _guard = self.prune_lock.read();
        let mut stats = IndexStats::default();
        self.root.collect_stats(&mut stats);
        if stats.leaf_count > 0 {
            stats.avg_values_per_leaf = stats.value_count as f64 / stats.leaf_count as f64;
        }
        stats
    }
}

impl<T: Clone> Knn<T> {
    /// Exact nearest-neighbor search.
    ///
    /// Streams stored values through `callback` in order of non-decreasing
    /// spherical distance from `(lat, lng)`. The callback returns `true` to
    /// stop the search ("I have enough"); with a callback that always
    /// returns `false` every stored value is emitted exactly once.
    ///
    /// Cancellation is cooperative: `token` is checked before every queue
    /// pop and never interrupts an in-flight callback. A pre-cancelled
    /// token yields no emissions. Values are copied out of the tree before
    /// the callback sees them, so no node lock is held while it runs.
    pub fn search(
        &self,
        token: &CancellationToken,
        lat: f64,
        lng: f64,
        mut callback: impl FnMut(&Value<T>) -> bool,
    ) {
        let _guard = self.prune_lock.read();
        let focus = cell::point(lat, lng);
        let mut queue = BinaryHeap::new();
        queue.push(Nearest::new(0.0, Frontier::Node(self.root.clone())));

        while !token.is_cancelled() {
            let Some(Nearest { entry, .. }) = queue.pop() else {
                return;
            };
            match entry {
                Frontier::Node(node) => match node.expand(&focus) {
                    Expansion::Values(values) => {
                        for (value, distance) in values {
                            queue.push(Nearest::new(distance, Frontier::Value(value)));
                        }
                    }
                    Expansion::Children(children) => {
                        for (child, distance) in children {
                            queue.push(Nearest::new(distance, Frontier::Node(child)));
                        }
                    }
                },
                Frontier::Value(value) => {
                    if callback(&value) {
                        return;
                    }
                }
            }
        }
    }

    /// Approximate nearest-neighbor search.
    ///
    /// Same contract as [`search`](Knn::search), but values are emitted
    /// grouped by their enclosing leaf rather than in strict per-value
    /// distance order: when the nearest frontier element is a leaf, all of
    /// its values stream through the callback immediately. This skips one
    /// priority-queue insertion per value and is faster for large result
    /// sets; the ordering error is bounded by the leaf granularity, i.e.
    /// by the configured precision.
    pub fn search_approximate(
        &self,
        token: &CancellationToken,
        lat: f64,
        lng: f64,
        mut callback: impl FnMut(&Value<T>) -> bool,
    ) {
        let _guard = self.prune_lock.read();
        let focus = cell::point(lat, lng);
        let mut queue = BinaryHeap::new();
        queue.push(Nearest::new(0.0, self.root.clone()));

        while !token.is_cancelled() {
            let Some(Nearest { entry: node, .. }) = queue.pop() else {
                return;
            };
            let leaf_values = node.expand_leafwise(&focus, |child, distance| {
                queue.push(Nearest::new(distance, child));
            });
            if let Some(values) = leaf_values {
                for value in &values {
                    if callback(value) {
                        return;
                    }
                }
            }
        }
    }
}
