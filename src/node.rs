//! Tree vertices of the adaptive cell index.
//!
//! Each node covers one spherical cell and either holds values directly
//! (leaf) or routes them to children one cell level deeper. A leaf splits
//! once it overflows [`MAX_VALUES_PER_CELL`], pushing its residents into
//! children, down to the configured maximum depth where leaves grow
//! unbounded instead.
//!
//! Locking: a node guards its values and its child list with separate
//! read-write locks. When both are taken, values is always acquired first;
//! parent locks are always acquired before child locks. Queue-loading for
//! searches reads both under shared locks so a concurrent split is
//! observed either fully applied or not at all.

use std::sync::Arc;

use parking_lot::RwLock;
use s2::cellid::CellID;
use s2::point::Point;
use tracing::debug;

use crate::cell::{self, MAX_VALUES_PER_CELL};
use crate::knn::IndexStats;
use crate::value::Value;

pub(crate) struct Node<T> {
    cell: CellID,
    level: u64,
    max_depth: u64,
    values: RwLock<Vec<Value<T>>>,
    children: RwLock<Vec<Arc<Node<T>>>>,
}

/// What a popped node feeds back into the search frontier.
pub(crate) enum Expansion<T> {
    /// Leaf: resident values with their distances to the query point.
    Values(Vec<(Value<T>, f64)>),
    /// Internal node: children with their distances to the query point.
    Children(Vec<(Arc<Node<T>>, f64)>),
}

impl<T> Node<T> {
    /// Root sentinel at level 0, conceptually covering the whole sphere.
    pub(crate) fn root(max_depth: u64) -> Arc<Self> {
        Arc::new(Self {
            cell: CellID(0),
            level: 0,
            max_depth,
            values: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
        })
    }

    fn child_of(parent: &Node<T>, cell: CellID) -> Arc<Self> {
        Arc::new(Self {
            cell,
            level: cell::level(cell),
            max_depth: parent.max_depth,
            values: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::with_capacity(1)),
        })
    }

    #[cfg(test)]
    pub(crate) fn cell(&self) -> CellID {
        self.cell
    }

    #[cfg(test)]
    pub(crate) fn level(&self) -> u64 {
        self.level
    }

    /// Places `(key, payload, value_cell)` in the subtree under `node` and
    /// returns the node that received it. Keys relocated by a split are
    /// appended to `moved` so the caller can refresh its lookup map.
    pub(crate) fn add_value(
        node: &Arc<Node<T>>,
        key: String,
        payload: T,
        value_cell: CellID,
        moved: &mut Vec<(String, Arc<Node<T>>)>,
    ) -> Arc<Node<T>> {
        loop {
            // Internal node: route one level down.
            if !node.children.read().is_empty() {
                let child = node.get_or_create_child(cell::parent(value_cell, node.level + 1));
                return Node::add_value(&child, key, payload, value_cell, moved);
            }

            let mut values = node.values.write();
            // A concurrent insert may have split this node between the leaf
            // check and the write lock; retry through the children.
            if !node.children.read().is_empty() {
                continue;
            }

            if values.len() < MAX_VALUES_PER_CELL || node.level == node.max_depth {
                values.push(Value::new(key, payload, value_cell));
                return node.clone();
            }

            // Overflow below the depth limit: push every resident value one
            // level down, then route the new value the same way. The values
            // lock is held across the whole split so concurrent inserts on
            // this node wait and then retry against the children.
            debug!(level = node.level, "splitting leaf");
            let residents: Vec<Value<T>> = values.drain(..).collect();
            for resident in residents {
                let (resident_key, resident_payload, resident_cell) = resident.into_parts();
                let child = node.get_or_create_child(cell::parent(resident_cell, node.level + 1));
                let target = Node::add_value(
                    &child,
                    resident_key.clone(),
                    resident_payload,
                    resident_cell,
                    moved,
                );
                moved.push((resident_key, target));
            }
            drop(values);

            let child = node.get_or_create_child(cell::parent(value_cell, node.level + 1));
            return Node::add_value(&child, key, payload, value_cell, moved);
        }
    }

    /// Finds the child covering `cell`, creating it if absent.
    ///
    /// Double-checked: shared scan, then exclusive re-scan before the
    /// append, so concurrent callers converge on a single child per cell.
    pub(crate) fn get_or_create_child(&self, cell: CellID) -> Arc<Node<T>> {
        {
            let children = self.children.read();
            if let Some(child) = children.iter().find(|c| c.cell == cell) {
                return child.clone();
            }
        }

        let mut children = self.children.write();
        if let Some(child) = children.iter().find(|c| c.cell == cell) {
            return child.clone();
        }
        let child = Node::child_of(self, cell);
        children.push(child.clone());
        child
    }

    /// Removes the value stored under `key`, returning whether it was
    /// present in this node. Does not restructure the tree.
    pub(crate) fn remove_value(&self, key: &str) -> bool {
        let mut values = self.values.write();
        match values.iter().position(|v| v.key() == key) {
            Some(index) => {
                values.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Replaces the payload of `key` in place when its stored cell equals
    /// `cell`. Hands the payload back when the key is absent here or its
    /// cell changed, in which case the caller must remove and re-add.
    pub(crate) fn update_value(&self, key: &str, cell: CellID, payload: T) -> Option<T> {
        let mut values = self.values.write();
        match values.iter_mut().find(|v| v.key() == key) {
            Some(value) if value.cell() == cell => {
                value.set_payload(payload);
                None
            }
            _ => Some(payload),
        }
    }

    /// This node's contribution to a search frontier: a leaf yields its
    /// values, an internal node its children, each paired with its distance
    /// to `point`. Values are cloned out so no node lock is held when the
    /// search callback later runs, and the leaf-vs-internal decision is
    /// made under both read locks so a concurrent split is observed either
    /// fully applied or not at all.
    pub(crate) fn expand(&self, point: &Point) -> Expansion<T>
    where
        T: Clone,
    {
        let values = self.values.read();
        let children = self.children.read();
        if children.is_empty() {
            Expansion::Values(
                values
                    .iter()
                    .map(|value| (value.clone(), cell::distance(value.cell(), point)))
                    .collect(),
            )
        } else {
            Expansion::Children(
                children
                    .iter()
                    .map(|child| (child.clone(), cell::distance(child.cell, point)))
                    .collect(),
            )
        }
    }

    /// Approximate-search variant of [`expand`](Self::expand): internal
    /// nodes feed their children into the queue, leaves hand back a
    /// snapshot of their values for direct iteration.
    pub(crate) fn expand_leafwise(
        &self,
        point: &Point,
        mut push_child: impl FnMut(Arc<Node<T>>, f64),
    ) -> Option<Vec<Value<T>>>
    where
        T: Clone,
    {
        let values = self.values.read();
        let children = self.children.read();
        if children.is_empty() {
            return Some((*values).clone());
        }
        for child in children.iter() {
            push_child(child.clone(), cell::distance(child.cell, point));
        }
        None
    }

    /// Depth-first collapse of branches left empty by removals. Only runs
    /// under the index-exclusive prune lock, so no mutation races it.
    pub(crate) fn prune(&self) {
        let mut children = self.children.write();
        for child in children.iter() {
            child.prune();
        }
        children.retain(|child| !child.is_empty_subtree());
    }

    fn is_empty_subtree(&self) -> bool {
        self.values.read().is_empty() && self.children.read().is_empty()
    }

    /// Accumulates leaf occupancy over this subtree. Only leaves holding at
    /// least one value are counted.
    pub(crate) fn collect_stats(&self, stats: &mut IndexStats) {
        let children = self.children.read();
        if children.is_empty() {
            let held = self.values.read().len();
            if held > 0 {
                stats.value_count += held;
                stats.leaf_count += 1;
                stats.max_values_per_leaf = stats.max_values_per_leaf.max(held);
            }
            return;
        }
        for child in children.iter() {
            child.collect_stats(stats);
        }
    }

    #[cfg(test)]
    pub(crate) fn value_count(&self) -> usize {
        self.values.read().len()
    }

    #[cfg(test)]
    pub(crate) fn child_count(&self) -> usize {
        self.children.read().len()
    }
}
