//! Sorted position index.
//!
//! Positions are keyed by nominal collateral ratio (NICR = coll / debt,
//! price independent). For a single collateral type ascending NICR is the
//! same order as ascending ICR, and redistribution preserves it, so the
//! engine can walk candidates lowest-first without re-sorting.

use alloy::primitives::U256;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;

use crate::types::PositionId;

/// Sorted-by-collateralization position index.
pub trait PositionIndex: Send + Sync + Debug {
    /// Insert a position or move it to its new key.
    fn insert(&self, id: PositionId, nicr: U256);

    /// Remove a position (no-op when absent).
    fn remove(&self, id: PositionId);

    /// Whether the position is indexed.
    fn contains(&self, id: PositionId) -> bool;

    /// Up to `limit` ids in ascending NICR order.
    fn ascending(&self, limit: usize) -> Vec<PositionId>;

    /// Number of indexed positions.
    fn len(&self) -> usize;

    /// Whether the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct IndexInner {
    /// (nicr, id) ordered; the id breaks ties deterministically
    ordered: BTreeSet<(U256, PositionId)>,
    /// Reverse lookup id -> current key
    keys: HashMap<PositionId, U256>,
}

/// `BTreeSet` backed NICR index.
#[derive(Debug, Default)]
pub struct NicrSortedIndex {
    inner: RwLock<IndexInner>,
}

impl NicrSortedIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current key of a position.
    pub fn key_of(&self, id: PositionId) -> Option<U256> {
        self.inner.read().keys.get(&id).copied()
    }
}

impl PositionIndex for NicrSortedIndex {
    fn insert(&self, id: PositionId, nicr: U256) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.keys.insert(id, nicr) {
            inner.ordered.remove(&(old, id));
        }
        inner.ordered.insert((nicr, id));
    }

    fn remove(&self, id: PositionId) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.keys.remove(&id) {
            inner.ordered.remove(&(old, id));
        }
    }

    fn contains(&self, id: PositionId) -> bool {
        self.inner.read().keys.contains_key(&id)
    }

    fn ascending(&self, limit: usize) -> Vec<PositionId> {
        self.inner
            .read()
            .ordered
            .iter()
            .take(limit)
            .map(|(_, id)| *id)
            .collect()
    }

    fn len(&self) -> usize {
        self.inner.read().keys.len()
    }
}
