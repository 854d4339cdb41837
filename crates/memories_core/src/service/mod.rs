//! Use-case orchestration over the index and an asset source.
//!
//! # Responsibility
//! - Provide the entry points presentation callers drive.
//! - Keep threading and subscription bookkeeping out of the index types.

pub mod memories_service;
