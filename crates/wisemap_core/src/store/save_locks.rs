//! Per-document exclusive sections for mutating store operations.
//!
//! # Responsibility
//! - Serialize `save`/`delete` calls that target the same `MapId`.
//!
//! # Invariants
//! - Waiters queue on the same async mutex; nothing is rejected.
//! - A slot is pruned only when no guard or waiter still references it, so
//!   two concurrent sections for one id can never exist.

use crate::model::map::MapId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Keyed table of async mutexes.
#[derive(Debug, Default)]
pub struct SaveLocks {
    slots: Mutex<HashMap<MapId, Slot>>,
}

impl SaveLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the exclusive section for `id` is free and enters it.
    pub async fn acquire(&self, id: MapId) -> SaveGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(id).or_default().clone()
        };
        let guard = slot.lock_owned().await;
        SaveGuard {
            locks: self,
            id,
            guard: Some(guard),
        }
    }

    /// Number of ids with a live section or waiter.
    pub fn active_len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Held exclusive section for one id; released on drop.
pub struct SaveGuard<'a> {
    locks: &'a SaveLocks,
    id: MapId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.locks.slots.lock();
        let idle = slots
            .get(&self.id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1);
        if idle {
            slots.remove(&self.id);
        }
    }
}
