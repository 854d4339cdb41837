//! Flattened selection mapping over a section snapshot.
//!
//! A flattened position addresses one item across all sections in order. It is
//! only meaningful against the exact section list it was computed from.

use crate::model::asset::AssetHandle;
use crate::model::section::Section;
use serde::{Deserialize, Serialize};

/// (section, item) address inside a section list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemCoordinate {
    pub section: usize,
    pub item: usize,
}

impl ItemCoordinate {
    pub fn new(section: usize, item: usize) -> Self {
        Self { section, item }
    }
}

/// Returns the flattened position of `coordinate`, or `None` when out of range.
pub fn flatten(sections: &[Section], coordinate: ItemCoordinate) -> Option<usize> {
    let target = sections.get(coordinate.section)?;
    if coordinate.item >= target.item_count() {
        return None;
    }
    let preceding: usize = sections[..coordinate.section]
        .iter()
        .map(Section::item_count)
        .sum();
    Some(preceding + coordinate.item)
}

/// Returns the coordinate holding `position`, or `None` past the last item.
pub fn unflatten(sections: &[Section], position: usize) -> Option<ItemCoordinate> {
    let mut start = 0;
    for (section, entry) in sections.iter().enumerate() {
        let end = start + entry.item_count();
        if position < end {
            return Some(ItemCoordinate::new(section, position - start));
        }
        start = end;
    }
    None
}

/// Every handle across all sections, with one selected position.
///
/// This is the hand-off model for a single-item viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedSelection {
    handles: Vec<AssetHandle>,
    selected_index: usize,
}

impl FlattenedSelection {
    pub fn handles(&self) -> &[AssetHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn selected(&self) -> Option<&AssetHandle> {
        self.handles.get(self.selected_index)
    }

    /// Moves the selection; out-of-range indices leave it unchanged.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.handles.len() {
            return false;
        }
        self.selected_index = index;
        true
    }
}

/// Materializes all handles in order and selects `target`.
///
/// Costs O(total items) per call. Returns `None` when `target` is out of range.
pub fn flatten_all(sections: &[Section], target: ItemCoordinate) -> Option<FlattenedSelection> {
    let selected_index = flatten(sections, target)?;
    let handles = sections
        .iter()
        .flat_map(|section| section.snapshot().iter().cloned())
        .collect();
    Some(FlattenedSelection {
        handles,
        selected_index,
    })
}
