//! Host shell seam for privileged UI services.
//!
//! # Responsibility
//! - Abstract the save dialog and URL opener owned by the host application.
//! - Ship `DirectoryHost`, a non-interactive shell for CLI/FFI embeddings.
//!
//! # Invariants
//! - `choose_save_path` returning `None` means the user cancelled.
//! - Host implementations never touch the storage root.

use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

const MAX_NAME_SUFFIX: usize = 999;

/// Save dialog parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveDialogRequest {
    /// Dialog window title.
    pub title: String,
    /// Suggested file name.
    pub default_name: String,
    /// Human-readable filter label.
    pub filter_name: String,
    /// Allowed extensions without leading dot.
    pub extensions: Vec<String>,
}

impl SaveDialogRequest {
    /// Dialog used when exporting one stored mindmap.
    pub fn for_map_export(title_hint: Option<&str>) -> Self {
        let default_name = match title_hint.map(str::trim).filter(|hint| !hint.is_empty()) {
            Some(hint) => format!("{hint}.wxml"),
            None => "mindmap.wxml".to_string(),
        };
        Self {
            title: "Export Mindmap".to_string(),
            default_name,
            filter_name: "WiseMapping Mindmap".to_string(),
            extensions: vec!["wxml".to_string()],
        }
    }

    /// Dialog used when saving converter output (images, outlines, ...).
    pub fn for_raw_export(name: &str, extension: &str) -> Self {
        let upper = extension.to_uppercase();
        Self {
            title: format!("Save {upper}"),
            default_name: name.to_string(),
            filter_name: format!("{upper} File"),
            extensions: vec![extension.to_string()],
        }
    }
}

/// Privileged services provided by the host application.
#[async_trait]
pub trait HostShell: Send + Sync {
    /// Asks the user for a destination path. `None` when cancelled.
    async fn choose_save_path(&self, request: SaveDialogRequest) -> Option<PathBuf>;

    /// Opens an external URL with the system handler.
    async fn open_external(&self, url: &str);
}

/// Headless host: exports land in a fixed directory, URLs are recorded.
#[derive(Debug)]
pub struct DirectoryHost {
    export_dir: PathBuf,
    opened: Mutex<Vec<String>>,
}

impl DirectoryHost {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// URLs passed to `open_external`, oldest first.
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl HostShell for DirectoryHost {
    async fn choose_save_path(&self, request: SaveDialogRequest) -> Option<PathBuf> {
        let name = sanitize_file_name(&request.default_name, &request.extensions);
        let path = unique_path(&self.export_dir, &name).await;
        if path.is_none() {
            info!(
                "event=save_dialog module=host status=skip reason=no_free_name name={}",
                name
            );
        }
        path
    }

    async fn open_external(&self, url: &str) {
        info!("event=open_external module=host status=ok url={}", url);
        self.opened.lock().push(url.to_string());
    }
}

/// Reduces a suggested name to a single safe path component.
pub fn sanitize_file_name(name: &str, extensions: &[String]) -> String {
    let cleaned = name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect::<String>();
    let cleaned = cleaned.trim().trim_start_matches('.').trim();
    let base = if cleaned.is_empty() { "export" } else { cleaned };

    match extensions.first() {
        Some(ext) if !base.to_lowercase().ends_with(&format!(".{}", ext.to_lowercase())) => {
            format!("{base}.{ext}")
        }
        _ => base.to_string(),
    }
}

async fn unique_path(dir: &Path, name: &str) -> Option<PathBuf> {
    let candidate = dir.join(name);
    if !tokio::fs::try_exists(&candidate).await.unwrap_or(true) {
        return Some(candidate);
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    for suffix in 1..=MAX_NAME_SUFFIX {
        let numbered = match ext {
            Some(ext) => format!("{stem} ({suffix}).{ext}"),
            None => format!("{stem} ({suffix})"),
        };
        let candidate = dir.join(numbered);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(true) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{sanitize_file_name, DirectoryHost, HostShell, SaveDialogRequest};

    #[test]
    fn export_dialog_defaults_follow_title_hint() {
        assert_eq!(
            SaveDialogRequest::for_map_export(Some("Trip")).default_name,
            "Trip.wxml"
        );
        assert_eq!(
            SaveDialogRequest::for_map_export(Some("  ")).default_name,
            "mindmap.wxml"
        );
        let raw = SaveDialogRequest::for_raw_export("map.png", "png");
        assert_eq!(raw.title, "Save PNG");
        assert_eq!(raw.extensions, vec!["png".to_string()]);
    }

    #[test]
    fn sanitize_strips_separators_and_adds_extension() {
        let exts = vec!["wxml".to_string()];
        assert_eq!(sanitize_file_name("../etc/passwd", &exts), "_etc_passwd.wxml");
        assert_eq!(sanitize_file_name("Plan.WXML", &exts), "Plan.WXML");
        assert_eq!(sanitize_file_name("   ", &exts), "export.wxml");
    }

    #[tokio::test]
    async fn directory_host_picks_free_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = DirectoryHost::new(dir.path());
        let request = SaveDialogRequest::for_map_export(Some("Plan"));

        let first = host.choose_save_path(request.clone()).await.expect("path");
        assert_eq!(first, dir.path().join("Plan.wxml"));
        std::fs::write(&first, "x").unwrap();

        let second = host.choose_save_path(request).await.expect("path");
        assert_eq!(second, dir.path().join("Plan (1).wxml"));
    }

    #[tokio::test]
    async fn directory_host_records_urls() {
        let host = DirectoryHost::new("/nowhere");
        host.open_external("https://www.wisemapping.com").await;
        assert_eq!(host.opened_urls(), vec!["https://www.wisemapping.com"]);
    }
}
