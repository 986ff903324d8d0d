//! File-backed mindmap storage engine.
//!
//! # Responsibility
//! - Own the storage root directory and every `<id>.wxml` file inside it.
//! - Provide async create/list/load/save/delete/export operations.
//!
//! # Invariants
//! - `MapStore` is the only writer of files under the storage root.
//! - `list()` degrades per file and never fails because of one document.
//! - `save`/`delete` for the same id run strictly one after another.
//!
//! # See also
//! - `crate::channel` for the only caller-facing entry point.

use crate::model::map::MapId;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

mod map_store;
mod save_locks;
mod write;

pub use map_store::{default_template, MapStore};
pub use save_locks::{SaveGuard, SaveLocks};

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage engine error.
#[derive(Debug)]
pub enum StoreError {
    /// No document file exists for this id.
    NotFound(MapId),
    /// Storage-side filesystem failure.
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// Destination-side failure while exporting.
    ExportFailure { path: PathBuf, source: io::Error },
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Maps a not-found IO error on a document path to `NotFound`.
    pub(crate) fn for_document(
        op: &'static str,
        id: MapId,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(id)
        } else {
            Self::io(op, path, source)
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Io { .. } => "io_error",
            Self::ExportFailure { .. } => "export_failure",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "mindmap not found: {id}"),
            Self::Io { op, path, source } => {
                write!(f, "{op} failed for `{}`: {source}", path.display())
            }
            Self::ExportFailure { path, source } => {
                write!(f, "export to `{}` failed: {source}", path.display())
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound(_) => None,
            Self::Io { source, .. } | Self::ExportFailure { source, .. } => Some(source),
        }
    }
}
