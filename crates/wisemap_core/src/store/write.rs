//! Low-level write disciplines for document files.
//!
//! # Invariants
//! - Temp files live next to their target and are named
//!   `.<target-name>.<random>.tmp`, which never matches the document filter.
//! - A failed write removes its temp file on a best-effort basis.
//! - `publish_new` never replaces an existing target.

use log::warn;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_name = format!(".{name}.{}.tmp", Uuid::new_v4().simple());
    match target.parent() {
        Some(parent) => parent.join(temp_name),
        None => PathBuf::from(temp_name),
    }
}

async fn write_new_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

async fn discard_temp(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(
                "event=temp_cleanup module=store status=error path={} error={}",
                path.display(),
                err
            );
        }
    }
}

/// Writes a fully synced temp file, then renames it over `target`.
pub(crate) async fn replace_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp = temp_path_for(target);
    if let Err(err) = write_new_file(&temp, bytes).await {
        discard_temp(&temp).await;
        return Err(err);
    }
    if let Err(err) = fs::rename(&temp, target).await {
        discard_temp(&temp).await;
        return Err(err);
    }
    Ok(())
}

/// Writes `target` in place, truncating existing content.
pub(crate) async fn replace_in_place(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(target)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Materializes a brand-new `target` without ever overwriting one.
///
/// With `atomic` set, content is staged in a temp file and hard-linked into
/// place so readers never see a partial file. Filesystems without hard links
/// fall back to rename after an existence check.
///
/// # Errors
/// - `AlreadyExists` when `target` is already present.
pub(crate) async fn publish_new(target: &Path, bytes: &[u8], atomic: bool) -> io::Result<()> {
    if !atomic {
        return write_new_file(target, bytes).await;
    }

    let temp = temp_path_for(target);
    if let Err(err) = write_new_file(&temp, bytes).await {
        discard_temp(&temp).await;
        return Err(err);
    }

    let linked = fs::hard_link(&temp, target).await;
    let result = match linked {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(err),
        Err(_) => {
            if fs::try_exists(target).await? {
                Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "document file already exists",
                ))
            } else {
                return fs::rename(&temp, target).await;
            }
        }
    };
    discard_temp(&temp).await;
    result
}

/// Restores `previous` as the mtime of `target` if the new mtime went back.
///
/// Keeps modification times non-decreasing across saves of one document even
/// when the wall clock moves backwards.
pub(crate) async fn keep_modified_monotonic(
    target: &Path,
    previous: Option<SystemTime>,
) -> io::Result<()> {
    let Some(previous) = previous else {
        return Ok(());
    };
    let current = fs::metadata(target).await?.modified()?;
    if current >= previous {
        return Ok(());
    }

    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new()
            .write(true)
            .open(&target)?
            .set_modified(previous)
    })
    .await
    .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::{keep_modified_monotonic, publish_new, replace_atomic};
    use std::time::{Duration, SystemTime};

    #[tokio::test]
    async fn replace_atomic_swaps_content_and_leaves_no_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("a.wxml");
        std::fs::write(&target, "old").unwrap();

        replace_atomic(&target, b"new").await.expect("atomic replace");

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn publish_new_refuses_to_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("b.wxml");
        std::fs::write(&target, "keep").unwrap();

        for atomic in [true, false] {
            let err = publish_new(&target, b"clobber", atomic)
                .await
                .expect_err("existing file must not be replaced");
            assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        }
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "keep");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn keep_modified_monotonic_restores_newer_previous_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("c.wxml");
        std::fs::write(&target, "x").unwrap();
        let future = SystemTime::now() + Duration::from_secs(3600);

        keep_modified_monotonic(&target, Some(future))
            .await
            .expect("mtime fix-up");

        let modified = std::fs::metadata(&target).unwrap().modified().unwrap();
        assert!(modified >= future - Duration::from_secs(1));
    }
}
