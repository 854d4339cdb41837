//! Snapshot and section model.
//!
//! # Responsibility
//! - Hold one year's ordered result exactly as the source produced it.
//! - Derive section metadata (year, count) from the snapshot itself.
//!
//! # Invariants
//! - A `Section` never wraps an empty snapshot.
//! - Section year is read from the first handle and never stored separately.
//! - Snapshots compare by value; no section keeps a pointer back to its source.

use crate::model::asset::AssetHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity of the source query that produced a snapshot.
///
/// One query selects every asset captured on `month`/`day` of `year`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FetchKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

/// Ordered, immutable-at-a-point-in-time sequence of handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    key: FetchKey,
    handles: Arc<[AssetHandle]>,
}

impl Snapshot {
    pub fn new(key: FetchKey, handles: Vec<AssetHandle>) -> Self {
        Self {
            key,
            handles: handles.into(),
        }
    }

    pub fn key(&self) -> FetchKey {
        self.key
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AssetHandle> {
        self.handles.get(index)
    }

    pub fn first(&self) -> Option<&AssetHandle> {
        self.handles.first()
    }

    pub fn handles(&self) -> &[AssetHandle] {
        &self.handles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AssetHandle> {
        self.handles.iter()
    }
}

/// One qualifying year within the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    snapshot: Snapshot,
}

impl Section {
    /// Wraps a snapshot, returning `None` for an empty one.
    pub fn from_snapshot(snapshot: Snapshot) -> Option<Self> {
        if snapshot.is_empty() {
            return None;
        }
        Some(Self { snapshot })
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Year of the first handle; `None` only for an empty snapshot.
    pub fn year(&self) -> Option<i32> {
        self.snapshot.first().map(AssetHandle::year)
    }

    pub fn item_count(&self) -> usize {
        self.snapshot.len()
    }

    pub fn handle(&self, item: usize) -> Option<&AssetHandle> {
        self.snapshot.get(item)
    }

    /// Swaps in a newer snapshot of the same query.
    ///
    /// Returns `false` and keeps the old snapshot when `snapshot` is empty.
    pub(crate) fn replace_snapshot(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.is_empty() {
            return false;
        }
        self.snapshot = snapshot;
        true
    }
}
