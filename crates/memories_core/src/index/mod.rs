//! Multi-year section index and its maintenance.
//!
//! # Responsibility
//! - Track the reference date and step it by calendar day.
//! - Build and hold the ordered year sections for that date.
//! - Map flattened selection positions to section coordinates.
//! - Reconcile live source mutations into per-section change events.
//!
//! # Invariants
//! - The section list never holds an empty section.
//! - Only the rebuild stamped with the newest token may be installed.
//! - Reconciliation walks sections from the highest index down.

pub mod cursor;
pub mod reconcile;
pub mod sections;
pub mod selection;
