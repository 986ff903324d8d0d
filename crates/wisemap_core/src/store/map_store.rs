//! `MapStore`: the file-per-document storage engine.
//!
//! # Responsibility
//! - Translate document ids into paths under the configured root.
//! - Implement the storage lifecycle and listing with metadata extraction.
//! - Guard exports with the optional destination scope.
//!
//! # Invariants
//! - Listing order is `modified DESC, id ASC`.
//! - `save` never creates a document; `create` never overwrites one.
//! - Document content never appears in log events.

use super::save_locks::SaveLocks;
use super::write::{keep_modified_monotonic, publish_new, replace_atomic, replace_in_place};
use super::{StoreError, StoreResult};
use crate::config::StorageConfig;
use crate::markup::escape_attribute;
use crate::metadata::extract_title;
use crate::model::map::{MapId, MapMetadata, MAP_FILE_EXTENSION};
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::fs;

const DEFAULT_TEMPLATE_TITLE: &str = "{title}";
const DEFAULT_TEMPLATE: &str = r#"<map name="new" version="tango" theme="prism" layout="mindmap">
    <topic central="true" text="{title}" id="1" fontStyle=";;#ffffff;;;"/>
</map>"#;
const CREATE_ATTEMPTS: usize = 3;

/// Default content for a new document with `title` on its central topic.
pub fn default_template(title: &str) -> String {
    DEFAULT_TEMPLATE.replace(DEFAULT_TEMPLATE_TITLE, &escape_attribute(title))
}

/// File-backed mindmap storage engine.
#[derive(Debug)]
pub struct MapStore {
    config: StorageConfig,
    locks: SaveLocks,
}

impl MapStore {
    /// Creates an engine over `config.root`. No IO happens until
    /// `initialize` or the first operation.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            locks: SaveLocks::new(),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Storage root directory.
    pub fn storage_location(&self) -> &Path {
        self.config.root()
    }

    /// Path of the backing file for `id`.
    pub fn document_path(&self, id: MapId) -> PathBuf {
        self.config.root().join(id.file_name())
    }

    /// Ensures the storage root exists. Safe to call repeatedly.
    pub async fn initialize(&self) -> StoreResult<()> {
        let root = self.config.root();
        fs::create_dir_all(root).await.map_err(|err| {
            error!(
                "event=store_init module=store status=error root={} error={}",
                root.display(),
                err
            );
            StoreError::io("create storage root", root, err)
        })
    }

    /// Lists every readable document, newest first.
    ///
    /// Files that fail to stat, read or decode are logged and left out.
    ///
    /// # Errors
    /// - `Io` only when the root itself cannot be created or enumerated.
    pub async fn list(&self) -> StoreResult<Vec<MapMetadata>> {
        let started_at = Instant::now();
        self.initialize().await?;

        let root = self.config.root();
        let mut entries = fs::read_dir(root)
            .await
            .map_err(|err| StoreError::io("read storage root", root, err))?;
        let mut candidates = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => return Err(StoreError::io("read storage root", root, err)),
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(id) = MapId::from_file_name(name) else {
                let is_map_like = name
                    .rsplit_once('.')
                    .is_some_and(|(stem, ext)| ext == MAP_FILE_EXTENSION && !stem.starts_with('.'));
                if is_map_like {
                    debug!(
                        "event=map_list_skip module=store status=skip reason=not_a_document name={:?}",
                        name
                    );
                }
                continue;
            };
            candidates.push((id, entry.path()));
        }

        let results = stream::iter(candidates)
            .map(|(id, path)| async move {
                let record = read_record(id, &path).await;
                (id, path, record)
            })
            .buffer_unordered(self.config.effective_list_concurrency())
            .collect::<Vec<_>>()
            .await;

        let mut skipped = 0usize;
        let mut records = Vec::with_capacity(results.len());
        for (id, path, record) in results {
            match record {
                Ok(record) => records.push(record),
                Err(err) => {
                    skipped += 1;
                    warn!(
                        "event=map_list_skip module=store status=skip id={} path={} error={}",
                        id,
                        path.display(),
                        err
                    );
                }
            }
        }
        records.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.id.cmp(&b.id)));

        info!(
            "event=map_list module=store status=ok count={} skipped={} duration_ms={}",
            records.len(),
            skipped,
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }

    /// Whether a document file exists for `id`.
    pub async fn contains(&self, id: MapId) -> StoreResult<bool> {
        let path = self.document_path(id);
        fs::try_exists(&path)
            .await
            .map_err(|err| StoreError::io("stat mindmap", path, err))
    }

    /// Returns the full content of one document.
    pub async fn load(&self, id: MapId) -> StoreResult<String> {
        let path = self.document_path(id);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|err| StoreError::for_document("read mindmap", id, &path, err))?;
        debug!(
            "event=map_load module=store status=ok id={} bytes={}",
            id,
            content.len()
        );
        Ok(content)
    }

    /// Replaces the full content of an existing document.
    ///
    /// Runs inside the per-id exclusive section, so concurrent saves of one
    /// document are applied one after another in arrival order.
    ///
    /// # Errors
    /// - `NotFound` when the document does not exist (saves never recreate).
    /// - `Io` on write failure; the previous content stays intact when atomic
    ///   writes are enabled.
    pub async fn save(&self, id: MapId, content: &str) -> StoreResult<()> {
        let started_at = Instant::now();
        let _section = self.locks.acquire(id).await;
        let path = self.document_path(id);

        let previous = fs::metadata(&path)
            .await
            .map_err(|err| StoreError::for_document("stat mindmap", id, &path, err))?;

        let written = if self.config.atomic_writes {
            replace_atomic(&path, content.as_bytes()).await
        } else {
            replace_in_place(&path, content.as_bytes()).await
        };
        if let Err(err) = written {
            error!(
                "event=map_save module=store status=error id={} duration_ms={} error={}",
                id,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(StoreError::io("write mindmap", path, err));
        }

        if let Err(err) = keep_modified_monotonic(&path, previous.modified().ok()).await {
            warn!(
                "event=map_save_mtime module=store status=error id={} error={}",
                id, err
            );
        }

        info!(
            "event=map_save module=store status=ok id={} bytes={} duration_ms={}",
            id,
            content.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Creates a document from the default template and returns its id.
    pub async fn create(&self, title: &str) -> StoreResult<MapId> {
        self.initialize().await?;
        let content = default_template(title);

        for _ in 0..CREATE_ATTEMPTS {
            let id = MapId::generate();
            let path = self.document_path(id);
            match publish_new(&path, content.as_bytes(), self.config.atomic_writes).await {
                Ok(()) => {
                    info!("event=map_create module=store status=ok id={}", id);
                    return Ok(id);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(
                        "event=map_create module=store status=retry id={} reason=id_collision",
                        id
                    );
                }
                Err(err) => {
                    error!(
                        "event=map_create module=store status=error id={} error={}",
                        id, err
                    );
                    return Err(StoreError::io("create mindmap", path, err));
                }
            }
        }

        Err(StoreError::io(
            "create mindmap",
            self.config.root(),
            io::Error::new(io::ErrorKind::AlreadyExists, "could not allocate a fresh id"),
        ))
    }

    /// Removes a document. Its id is invalid afterwards.
    pub async fn delete(&self, id: MapId) -> StoreResult<()> {
        let _section = self.locks.acquire(id).await;
        let path = self.document_path(id);
        fs::remove_file(&path)
            .await
            .map_err(|err| StoreError::for_document("delete mindmap", id, &path, err))?;
        info!("event=map_delete module=store status=ok id={}", id);
        Ok(())
    }

    /// Copies the current on-disk content of `id` to `destination`.
    ///
    /// # Errors
    /// - `NotFound` when the source document is missing.
    /// - `ExportFailure` when the destination is out of scope or unwritable.
    pub async fn export_to(&self, id: MapId, destination: &Path) -> StoreResult<()> {
        self.check_export_destination(destination).await?;
        let source = self.document_path(id);
        let bytes = fs::read(&source)
            .await
            .map_err(|err| StoreError::for_document("read mindmap", id, &source, err))?;
        self.write_destination(destination, &bytes).await?;
        info!(
            "event=map_export module=store status=ok id={} destination={}",
            id,
            destination.display()
        );
        Ok(())
    }

    /// Writes caller-supplied bytes to an external destination.
    ///
    /// Independent of the document set; shares the export scope rules.
    pub async fn write_external(&self, destination: &Path, bytes: &[u8]) -> StoreResult<()> {
        self.check_export_destination(destination).await?;
        self.write_destination(destination, bytes).await?;
        info!(
            "event=raw_export module=store status=ok destination={} bytes={}",
            destination.display(),
            bytes.len()
        );
        Ok(())
    }

    async fn write_destination(&self, destination: &Path, bytes: &[u8]) -> StoreResult<()> {
        fs::write(destination, bytes).await.map_err(|err| {
            error!(
                "event=export_write module=store status=error destination={} error={}",
                destination.display(),
                err
            );
            StoreError::ExportFailure {
                path: destination.to_path_buf(),
                source: err,
            }
        })
    }

    async fn check_export_destination(&self, destination: &Path) -> StoreResult<()> {
        let rejected = |reason: &str| StoreError::ExportFailure {
            path: destination.to_path_buf(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, reason.to_string()),
        };

        if destination.file_name().is_none() {
            return Err(rejected("destination has no file name"));
        }
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let parent = fs::canonicalize(parent)
            .await
            .map_err(|err| StoreError::ExportFailure {
                path: destination.to_path_buf(),
                source: err,
            })?;

        if let Ok(root) = fs::canonicalize(self.config.root()).await {
            if parent.starts_with(&root) {
                return Err(rejected("destination is inside the storage root"));
            }
        }

        if self.config.export_roots.is_empty() {
            return Ok(());
        }
        for allowed in &self.config.export_roots {
            if let Ok(allowed) = fs::canonicalize(allowed).await {
                if parent.starts_with(&allowed) {
                    return Ok(());
                }
            }
        }
        warn!(
            "event=export_scope module=store status=error destination={}",
            destination.display()
        );
        Err(rejected("destination is outside the permitted export roots"))
    }
}

async fn read_record(id: MapId, path: &Path) -> StoreResult<MapMetadata> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|err| StoreError::for_document("stat mindmap", id, path, err))?;
    if !metadata.is_file() {
        return Err(StoreError::io(
            "stat mindmap",
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    let content = fs::read_to_string(path)
        .await
        .map_err(|err| StoreError::for_document("read mindmap", id, path, err))?;

    let modified = metadata
        .modified()
        .map_err(|err| StoreError::io("stat mindmap", path, err))?;
    let created = metadata.created().unwrap_or(modified);

    Ok(MapMetadata {
        id,
        title: extract_title(&content),
        created: epoch_millis(created),
        modified: epoch_millis(modified),
        location: path.to_path_buf(),
    })
}

fn epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
    }
}
