//! Domain model for file-backed mindmap documents.
//!
//! # Responsibility
//! - Define the identity and listing shapes shared by store, channel and
//!   persistence layers.
//!
//! # Invariants
//! - Every document is identified by a stable `MapId`.
//! - Titles are derived from content and never stored on their own.
//!
//! # See also
//! - `crate::metadata` for title derivation.

pub mod map;
