//! Core domain logic for Memories.
//! This crate is the single source of truth for the "on this day" index invariants.

pub mod config;
pub mod index;
pub mod logging;
pub mod model;
pub mod service;
pub mod source;

pub use config::{ConfigError, MemoriesConfig};
pub use index::cursor::{CursorError, DateCursor};
pub use index::reconcile::{apply_update, classify, plan_section, reconcile, SectionUpdate};
pub use index::sections::{
    rebuild_sections, IndexStatus, RebuildApplied, RebuildTicket, RebuildToken, YearSectionIndex,
};
pub use index::selection::{flatten, flatten_all, unflatten, FlattenedSelection, ItemCoordinate};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LogSettings,
    LoggingError,
};
pub use model::asset::{AssetHandle, AssetId};
pub use model::change::{SectionChangeEvent, SectionChangeKind};
pub use model::section::{FetchKey, Section, Snapshot};
pub use service::memories_service::{MemoriesService, ServiceError};
pub use source::memory::{ChangeBatch, InMemoryLibrary, LibraryChange};
pub use source::{
    AssetSource, ChangeDetails, ChangeObserver, ObserverToken, SourceError, SourceResult,
};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
