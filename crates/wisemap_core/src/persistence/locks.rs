//! Editing lock capability for persistence sessions.
//!
//! # Responsibility
//! - Model the editor contract's lock/discard hooks as a capability handed to
//!   `MapPersistence` at construction.
//!
//! # Invariants
//! - Local single-user files ship only `NoLocks`: it never refuses, never
//!   records anything, and discard/unlock are no-ops on purpose. Shared
//!   editing is not supported.

use crate::model::map::MapId;
use uuid::Uuid;

/// Identity of one editor session (one adapter instance).
pub type SessionId = Uuid;

/// Lock capability consulted by `MapPersistence`.
pub trait EditLocks: Send + Sync {
    /// Claims `id` for `session`. Re-claiming by the holder succeeds.
    ///
    /// Returns the holding session on conflict.
    fn acquire(&self, id: MapId, session: SessionId) -> Result<(), SessionId>;

    /// Drops unsaved-changes state for `id`.
    fn discard_changes(&self, id: MapId, session: SessionId);

    /// Releases `id` if `session` holds it.
    fn unlock(&self, id: MapId, session: SessionId);
}

/// Local single-user mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocks;

impl EditLocks for NoLocks {
    fn acquire(&self, _id: MapId, _session: SessionId) -> Result<(), SessionId> {
        Ok(())
    }

    fn discard_changes(&self, _id: MapId, _session: SessionId) {}

    fn unlock(&self, _id: MapId, _session: SessionId) {}
}
