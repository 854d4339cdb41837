//! Per-section change events emitted by reconciliation.
//!
//! # Invariants
//! - `removed` item indices refer to the section before the mutation.
//! - `inserted` and `changed` item indices refer to the section after it.
//! - A removed section is reported as `FullReload` with `new_item_count == 0`.

use serde::{Deserialize, Serialize};

/// How a consumer should apply one section's change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SectionChangeKind {
    /// Discard and reload the whole section.
    FullReload,
    /// Apply itemized index sets.
    Incremental {
        removed: Vec<usize>,
        inserted: Vec<usize>,
        changed: Vec<usize>,
    },
}

/// One section's change, addressed by the section index at emission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionChangeEvent {
    pub section: usize,
    pub kind: SectionChangeKind,
    pub new_item_count: usize,
}

impl SectionChangeEvent {
    pub fn full_reload(section: usize, new_item_count: usize) -> Self {
        Self {
            section,
            kind: SectionChangeKind::FullReload,
            new_item_count,
        }
    }

    /// Event for a section that dropped out of the list.
    pub fn removal(section: usize) -> Self {
        Self::full_reload(section, 0)
    }

    pub fn incremental(
        section: usize,
        removed: Vec<usize>,
        inserted: Vec<usize>,
        changed: Vec<usize>,
        new_item_count: usize,
    ) -> Self {
        Self {
            section,
            kind: SectionChangeKind::Incremental {
                removed,
                inserted,
                changed,
            },
            new_item_count,
        }
    }

    pub fn is_full_reload(&self) -> bool {
        matches!(self.kind, SectionChangeKind::FullReload)
    }

    pub fn is_section_removal(&self) -> bool {
        self.is_full_reload() && self.new_item_count == 0
    }
}
