//! Asset handle model.
//!
//! # Responsibility
//! - Reference one item held by an external asset source.
//! - Carry the creation timestamp that section years are derived from.
//!
//! # Invariants
//! - `id` is stable for the asset lifetime inside its source.
//! - Core never owns asset content, only the handle.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of an asset inside its source.
pub type AssetId = Uuid;

/// Opaque reference to one captured item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetHandle {
    pub id: AssetId,
    /// Local capture time as reported by the source.
    pub created_at: NaiveDateTime,
}

impl AssetHandle {
    /// Creates a handle with a generated id.
    pub fn new(created_at: NaiveDateTime) -> Self {
        Self::with_id(Uuid::new_v4(), created_at)
    }

    /// Creates a handle for an id that already exists in a source.
    pub fn with_id(id: AssetId, created_at: NaiveDateTime) -> Self {
        Self { id, created_at }
    }

    /// Calendar year of the capture time.
    pub fn year(&self) -> i32 {
        self.created_at.year()
    }
}

#[cfg(test)]
mod tests {
    use super::AssetHandle;
    use chrono::NaiveDate;

    #[test]
    fn year_comes_from_creation_time() {
        let created_at = NaiveDate::from_ymd_opt(2019, 7, 16)
            .and_then(|day| day.and_hms_opt(8, 30, 0))
            .expect("valid timestamp");
        let handle = AssetHandle::new(created_at);
        assert_eq!(handle.year(), 2019);
    }
}
