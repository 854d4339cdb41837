//! Flutter-facing bindings for the memories core.

pub mod api;
