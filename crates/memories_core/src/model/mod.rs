//! Domain model for the multi-year "on this day" index.
//!
//! # Responsibility
//! - Define the value types shared by the index, reconciler and sources.
//! - Keep asset content outside core; only handles are modelled.
//!
//! # Invariants
//! - Every asset is identified by a stable `AssetId`.
//! - Snapshots are immutable once produced by a source.

pub mod asset;
pub mod change;
pub mod section;
