//! Storage configuration.
//!
//! # Responsibility
//! - Carry the storage root and engine tuning knobs into `MapStore`.
//! - Resolve the default root (explicit value, env override, documents dir).
//!
//! # Invariants
//! - Configuration is built once and passed at construction; core keeps no
//!   process-wide storage path state.
//! - `list_concurrency` is always clamped to `1..=LIST_CONCURRENCY_MAX`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Environment variable overriding the default storage root.
pub const STORAGE_DIR_ENV: &str = "WISEMAP_STORAGE_DIR";
/// Folder created under the user's documents directory by default.
pub const DEFAULT_STORAGE_FOLDER: &str = "WiseMapping";

const LIST_CONCURRENCY_DEFAULT: usize = 8;
const LIST_CONCURRENCY_MAX: usize = 64;

/// Storage engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one `<id>.wxml` file per document.
    pub root: PathBuf,
    /// Upper bound of concurrent per-file reads during `list()`.
    pub list_concurrency: usize,
    /// Write saves through a temp file + rename instead of in place.
    pub atomic_writes: bool,
    /// Directories exports may write into. Empty means unrestricted.
    pub export_roots: Vec<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            list_concurrency: LIST_CONCURRENCY_DEFAULT,
            atomic_writes: true,
            export_roots: Vec::new(),
        }
    }
}

impl StorageConfig {
    /// Builds a config rooted at `root` with default tuning.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Resolves the storage root.
    ///
    /// Order: explicit non-blank value, then `WISEMAP_STORAGE_DIR`, then
    /// `<documents>/WiseMapping`.
    ///
    /// # Errors
    /// - Returns `ConfigError::NoStorageRoot` when no candidate is available.
    pub fn resolve(explicit: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(root) = explicit.and_then(non_blank) {
            return Ok(Self::new(root));
        }
        if let Ok(raw) = std::env::var(STORAGE_DIR_ENV) {
            if let Some(root) = non_blank(&raw) {
                return Ok(Self::new(root));
            }
        }
        dirs::document_dir()
            .or_else(dirs::home_dir)
            .map(|base| Self::new(base.join(DEFAULT_STORAGE_FOLDER)))
            .ok_or(ConfigError::NoStorageRoot)
    }

    /// Parses a config from JSON, applying defaults for missing fields.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config = Self::parse_json(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Layers a JSON config file under an explicit root.
    ///
    /// Tuning knobs come from `raw_json` (blank or `None` means defaults).
    /// The root is the explicit non-blank value, then the JSON `root`, then
    /// the `resolve` fallbacks.
    ///
    /// # Errors
    /// - `ConfigError::Invalid` when `raw_json` is not a config object.
    /// - `ConfigError::NoStorageRoot` when no root candidate is available.
    pub fn resolve_with_overrides(
        explicit: Option<&str>,
        raw_json: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut config = match raw_json.filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => Self::parse_json(raw)?,
            None => Self::default(),
        };
        if let Some(root) = explicit.and_then(non_blank) {
            config.root = root;
        } else if config.root.as_os_str().is_empty() {
            config.root = Self::resolve(None)?.root;
        }
        config.validate()?;
        Ok(config)
    }

    fn parse_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    pub fn with_export_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.export_roots.push(root.into());
        self
    }

    pub fn with_atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    pub fn with_list_concurrency(mut self, value: usize) -> Self {
        self.list_concurrency = value;
        self
    }

    /// Effective list concurrency after clamping.
    pub fn effective_list_concurrency(&self) -> usize {
        self.list_concurrency.clamp(1, LIST_CONCURRENCY_MAX)
    }

    /// Checks structural requirements.
    ///
    /// # Errors
    /// - Returns `ConfigError::Invalid` when `root` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage root must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn non_blank(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    NoStorageRoot,
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoStorageRoot => write!(f, "no storage root could be resolved"),
            Self::Invalid(message) => write!(f, "invalid storage config: {message}"),
        }
    }
}

impl Error for ConfigError {}
