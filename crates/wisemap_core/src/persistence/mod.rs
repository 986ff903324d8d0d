//! Editor-facing persistence adapter.
//!
//! # Responsibility
//! - Satisfy the external editor engine's load/save/discard/unlock contract.
//! - Convert between channel text and the `MapDocument` tree.
//!
//! # Invariants
//! - The adapter reaches storage only through `CommandChannel`.
//! - Saved titles are derived from the serialized text, never from the
//!   in-memory tree.
//! - `NotFound` passes through untouched; parse failures become `Parse`.
//!
//! # See also
//! - `crate::markup::document` for the document model.

use crate::channel::ChannelError;
use crate::markup::MarkupError;
use crate::model::map::MapId;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod adapter;
pub mod locks;

pub use adapter::{MapPersistence, SaveHandle, SaveOptions, SaveOutcome};
pub use locks::{EditLocks, NoLocks, SessionId};

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Persistence adapter error.
#[derive(Debug)]
pub enum PersistenceError {
    /// No document exists for this id.
    NotFound(MapId),
    /// Stored text is not a well-formed mindmap document.
    Parse { id: MapId, source: MarkupError },
    /// The lock capability refused the claim.
    Locked { id: MapId, holder: String },
    /// Any other channel or storage failure.
    Channel(ChannelError),
    /// The background save task stopped before reporting.
    Interrupted(String),
}

impl PersistenceError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Parse { .. } => "parse_error",
            Self::Locked { .. } => "locked",
            Self::Channel(err) => err.kind(),
            Self::Interrupted(_) => "interrupted",
        }
    }
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "mindmap not found: {id}"),
            Self::Parse { id, source } => write!(f, "failed to parse mindmap {id}: {source}"),
            Self::Locked { id, holder } => {
                write!(f, "mindmap {id} is locked by session {holder}")
            }
            Self::Channel(err) => write!(f, "{err}"),
            Self::Interrupted(details) => write!(f, "save interrupted: {details}"),
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse { source, .. } => Some(source),
            Self::Channel(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChannelError> for PersistenceError {
    fn from(value: ChannelError) -> Self {
        match value {
            ChannelError::Store(StoreError::NotFound(id)) => Self::NotFound(id),
            other => Self::Channel(other),
        }
    }
}
