//! `MapPersistence`: load/save bridge between editor and channel.
//!
//! Saves issued by one adapter for the same id reach the channel in call
//! order, even when the caller never awaits the handles.

use super::locks::{EditLocks, NoLocks, SessionId};
use super::{PersistenceError, PersistenceResult};
use crate::channel::allow_list::{COMMAND_LOAD, COMMAND_SAVE};
use crate::channel::CommandChannel;
use crate::markup::{MapDocument, MarkupError};
use crate::metadata::extract_title;
use crate::model::map::MapId;
use log::{debug, error, info};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Editor-supplied save options.
///
/// Accepted for contract compatibility; a local file has no preference
/// storage and no revision history, so both are only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub pref: Option<String>,
    pub save_history: bool,
}

/// Successful save report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub id: MapId,
    /// Title derived from the text that was persisted.
    pub title: String,
}

/// Completion of one `save_document` call.
///
/// Await it for the outcome, or drop it to let the save finish in the
/// background.
pub struct SaveHandle {
    id: MapId,
    state: SaveState,
}

enum SaveState {
    Running(JoinHandle<PersistenceResult<SaveOutcome>>),
    Ready(Option<PersistenceResult<SaveOutcome>>),
}

impl SaveHandle {
    fn ready(id: MapId, result: PersistenceResult<SaveOutcome>) -> Self {
        Self {
            id,
            state: SaveState::Ready(Some(result)),
        }
    }

    pub fn id(&self) -> MapId {
        self.id
    }

    /// Whether the outcome is available without waiting.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            SaveState::Running(task) => task.is_finished(),
            SaveState::Ready(_) => true,
        }
    }
}

impl Future for SaveHandle {
    type Output = PersistenceResult<SaveOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            SaveState::Running(task) => Pin::new(task).poll(cx).map(|joined| match joined {
                Ok(result) => result,
                Err(err) => Err(PersistenceError::Interrupted(err.to_string())),
            }),
            SaveState::Ready(slot) => Poll::Ready(slot.take().unwrap_or_else(|| {
                Err(PersistenceError::Interrupted(
                    "save handle polled after completion".to_string(),
                ))
            })),
        }
    }
}

/// Tail of the pending save queue per id: the ticket of the newest save and
/// the signal it fires once finished.
type SaveChain = Arc<Mutex<HashMap<MapId, (u64, oneshot::Receiver<()>)>>>;

/// Persistence adapter for one editor session.
pub struct MapPersistence {
    channel: Arc<CommandChannel>,
    runtime: Handle,
    locks: Arc<dyn EditLocks>,
    session: SessionId,
    pending: SaveChain,
    next_ticket: AtomicU64,
}

impl MapPersistence {
    /// Creates a session. Saves are spawned on `runtime`.
    pub fn new(channel: Arc<CommandChannel>, runtime: Handle, locks: Arc<dyn EditLocks>) -> Self {
        Self {
            channel,
            runtime,
            locks,
            session: Uuid::new_v4(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Local single-user session backed by `NoLocks`.
    pub fn unlocked(channel: Arc<CommandChannel>, runtime: Handle) -> Self {
        Self::new(channel, runtime, Arc::new(NoLocks))
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Loads and parses one document.
    ///
    /// # Errors
    /// - `NotFound` when the document does not exist.
    /// - `Parse` when the stored text is not well-formed.
    /// - `Locked` when the lock capability refuses the claim.
    pub async fn load_document(&self, id: MapId) -> PersistenceResult<MapDocument> {
        let response = self
            .channel
            .invoke(COMMAND_LOAD, vec![Value::String(id.to_string())])
            .await?;
        let Value::String(text) = response else {
            return Err(PersistenceError::Parse {
                id,
                source: MarkupError::new(0, "load response is not text"),
            });
        };

        let document = MapDocument::parse(&text).map_err(|source| {
            error!(
                "event=map_parse module=persistence status=error id={} error={}",
                id, source
            );
            PersistenceError::Parse { id, source }
        })?;

        self.claim(id)?;
        debug!(
            "event=map_load module=persistence status=ok id={} session={}",
            id, self.session
        );
        Ok(document)
    }

    /// Serializes `model` and saves it in the background.
    ///
    /// Never fails synchronously; every outcome, including lock conflicts, is
    /// reported through the returned handle. The save starts only after the
    /// previous save of the same id from this adapter has finished.
    pub fn save_document(&self, id: MapId, model: &MapDocument, options: SaveOptions) -> SaveHandle {
        let xml = model.to_xml();
        let title = extract_title(&xml);
        debug!(
            "event=map_save_request module=persistence status=start id={} bytes={} save_history={} pref_set={}",
            id,
            xml.len(),
            options.save_history,
            options.pref.is_some()
        );

        if let Err(err) = self.claim(id) {
            return SaveHandle::ready(id, Err(err));
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (done, finished) = oneshot::channel::<()>();
        let previous = self.pending.lock().insert(id, (ticket, finished));

        let channel = self.channel.clone();
        let pending = self.pending.clone();
        let task = self.runtime.spawn(async move {
            if let Some((_, earlier)) = previous {
                // A sender dropped by a panicked save still releases the queue.
                let _ = earlier.await;
            }
            let args = vec![
                Value::String(id.to_string()),
                Value::String(xml),
                Value::String(title.clone()),
            ];
            let result = match channel.invoke(COMMAND_SAVE, args).await {
                Ok(_) => {
                    info!(
                        "event=map_save module=persistence status=ok id={} ticket={}",
                        id, ticket
                    );
                    Ok(SaveOutcome { id, title })
                }
                Err(err) => {
                    error!(
                        "event=map_save module=persistence status=error id={} error_kind={} error={}",
                        id,
                        err.kind(),
                        err
                    );
                    Err(PersistenceError::from(err))
                }
            };

            let _ = done.send(());
            let mut tails = pending.lock();
            if tails.get(&id).map(|(tail, _)| *tail) == Some(ticket) {
                tails.remove(&id);
            }
            result
        });

        SaveHandle {
            id,
            state: SaveState::Running(task),
        }
    }

    /// Delegates to the lock capability; a no-op in unlocked mode.
    pub fn discard_changes(&self, id: MapId) {
        self.locks.discard_changes(id, self.session);
    }

    /// Delegates to the lock capability; a no-op in unlocked mode.
    pub fn unlock(&self, id: MapId) {
        self.locks.unlock(id, self.session);
    }

    fn claim(&self, id: MapId) -> PersistenceResult<()> {
        self.locks
            .acquire(id, self.session)
            .map_err(|holder| PersistenceError::Locked {
                id,
                holder: holder.to_string(),
            })
    }
}
