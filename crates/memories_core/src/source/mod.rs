//! Asset source contract consumed by the index.
//!
//! # Responsibility
//! - Describe the opaque service that answers date queries and change diffs.
//! - Describe the single-method observer capability used for live updates.
//!
//! # Invariants
//! - `fetch_sections` preserves source-native ordering and omits empty years.
//! - `change_details` returning `None` means "nothing relevant changed".
//! - Observers are registered and deregistered explicitly by token.

use crate::model::section::Snapshot;
use chrono::NaiveDate;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod memory;

pub type SourceResult<T> = Result<T, SourceError>;

/// Failure answering a date query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Library access has not been granted.
    AccessDenied,
    /// Source could not serve the query right now.
    Unavailable(String),
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessDenied => write!(f, "asset library access denied"),
            Self::Unavailable(message) => write!(f, "asset source unavailable: {message}"),
        }
    }
}

impl Error for SourceError {}

/// Source-reported difference between a snapshot and its current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDetails {
    /// Fresh result of the same query after the mutation.
    pub snapshot_after: Snapshot,
    /// `false` when the source cannot itemize this change.
    pub has_incremental_changes: bool,
    /// `true` when surviving items changed relative order.
    pub has_moves: bool,
    /// Indices into the old snapshot.
    pub removed: Vec<usize>,
    /// Indices into `snapshot_after`.
    pub inserted: Vec<usize>,
    /// Indices into `snapshot_after`.
    pub changed: Vec<usize>,
}

/// Registration handle returned by `AssetSource::register_observer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(pub u64);

/// Receives batched mutation notifications from a source.
pub trait ChangeObserver<C>: Send + Sync {
    fn library_did_change(&self, change: &C);
}

/// Service that owns asset storage and query execution.
pub trait AssetSource: Send + Sync {
    /// Batched mutation notification delivered to observers.
    type Change: Send + Sync;

    /// Returns one snapshot per year that has items on `date`'s month/day.
    fn fetch_sections(&self, date: NaiveDate) -> SourceResult<Vec<Snapshot>>;

    /// Diffs `snapshot` against the source state after `change`.
    fn change_details(&self, snapshot: &Snapshot, change: &Self::Change)
        -> Option<ChangeDetails>;

    /// Hint that date-keyed caches should be rebuilt lazily.
    fn invalidate_cache(&self);

    fn register_observer(&self, observer: Arc<dyn ChangeObserver<Self::Change>>)
        -> ObserverToken;

    fn unregister_observer(&self, token: ObserverToken);
}
