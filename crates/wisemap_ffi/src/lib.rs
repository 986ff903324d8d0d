//! Flutter-facing bindings for the WiseMap core.

pub mod api;
