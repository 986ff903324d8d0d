//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the allow-listed command channel to Dart via FRB.
//! - Flatten every outcome into a reply envelope with a stable error kind.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Storage is reached only through `CommandChannel::invoke`.
//! - Storage is configured once per process; a different root is rejected.
//!
//! # See also
//! - `wisemap_core::channel` for command names and argument shapes.

use log::{info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Builder, Runtime};
use wisemap_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    supported_command_strings, CommandChannel, DirectoryHost, MapStore, StorageConfig,
};

const ERROR_KIND_NOT_CONFIGURED: &str = "not_configured";
const ERROR_KIND_INVALID_COMMAND: &str = "invalid_command";
const ERROR_KIND_RUNTIME: &str = "runtime_error";

static RUNTIME: OnceLock<Result<Runtime, String>> = OnceLock::new();
static STORAGE: OnceLock<ConfiguredStorage> = OnceLock::new();

struct ConfiguredStorage {
    root: PathBuf,
    channel: Arc<CommandChannel>,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Sync call; may perform small file-system setup work.
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Configures the document store and export directory.
///
/// Input semantics:
/// - `storage_dir`: storage root; `None` or blank falls back to
///   `WISEMAP_STORAGE_DIR`, then `<documents>/WiseMapping`.
/// - `export_dir`: directory the headless save dialog writes exports into.
/// - `config_json`: optional storage config object (`root`, `atomic_writes`,
///   `export_roots`, `list_concurrency`); `storage_dir` overrides its root.
///
/// # FFI contract
/// - Sync call; creates the storage root.
/// - Idempotent for the same resolved root; a different root returns error.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_storage(
    storage_dir: Option<String>,
    export_dir: String,
    config_json: Option<String>,
) -> String {
    match configure_storage_inner(
        storage_dir.as_deref(),
        export_dir.trim(),
        config_json.as_deref(),
    ) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Returns the configured storage root, or empty string before configuration.
#[flutter_rust_bridge::frb(sync)]
pub fn storage_location() -> String {
    STORAGE
        .get()
        .map(|storage| storage.root.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Allow-listed command names accepted by `channel_invoke`.
#[flutter_rust_bridge::frb(sync)]
pub fn supported_commands() -> Vec<String> {
    supported_command_strings()
        .iter()
        .map(|name| (*name).to_string())
        .collect()
}

/// Reply envelope for one channel invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReply {
    /// Whether the command succeeded.
    pub ok: bool,
    /// JSON-encoded result value (`null` on failure).
    pub payload_json: String,
    /// Stable error kind (`not_found|invalid_command|io_error|...`).
    pub error_kind: Option<String>,
    /// Human-readable diagnostics; empty on success.
    pub message: String,
}

impl ChannelReply {
    fn success(payload: &Value) -> Self {
        Self {
            ok: true,
            payload_json: payload.to_string(),
            error_kind: None,
            message: String::new(),
        }
    }

    fn failure(kind: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload_json: Value::Null.to_string(),
            error_kind: Some(kind.to_string()),
            message: message.into(),
        }
    }
}

/// Invokes one allow-listed command.
///
/// Input semantics:
/// - `command`: exact wire name, e.g. `mindmap:list`.
/// - `args_json`: JSON array of positional arguments; blank means `[]`.
///
/// # FFI contract
/// - Async from Dart; blocks an FRB worker thread, never the UI thread.
/// - Never panics; every failure is reported in the envelope.
pub fn channel_invoke(command: String, args_json: String) -> ChannelReply {
    let Some(storage) = STORAGE.get() else {
        return ChannelReply::failure(
            ERROR_KIND_NOT_CONFIGURED,
            "configure_storage must be called first",
        );
    };
    let args = match parse_args(&args_json) {
        Ok(args) => args,
        Err(message) => {
            warn!(
                "event=ffi_invoke module=ffi status=rejected command={:?} reason=bad_args",
                command
            );
            return ChannelReply::failure(ERROR_KIND_INVALID_COMMAND, message);
        }
    };
    let runtime = match shared_runtime() {
        Ok(runtime) => runtime,
        Err(message) => return ChannelReply::failure(ERROR_KIND_RUNTIME, message),
    };

    let channel = storage.channel.clone();
    match runtime.block_on(async move { channel.invoke(&command, args).await }) {
        Ok(payload) => ChannelReply::success(&payload),
        Err(err) => ChannelReply::failure(err.kind(), err.to_string()),
    }
}

fn configure_storage_inner(
    storage_dir: Option<&str>,
    export_dir: &str,
    config_json: Option<&str>,
) -> Result<(), String> {
    let config = StorageConfig::resolve_with_overrides(storage_dir, config_json)
        .map_err(|err| err.to_string())?;
    if let Some(active) = STORAGE.get() {
        return ensure_same_root(active, config.root());
    }
    if export_dir.is_empty() {
        return Err("export_dir cannot be empty".to_string());
    }

    let root = config.root().to_path_buf();
    let store = Arc::new(MapStore::new(config));
    let runtime = shared_runtime()?;
    runtime
        .block_on(store.initialize())
        .map_err(|err| err.to_string())?;
    let host = Arc::new(DirectoryHost::new(export_dir));
    let storage = ConfiguredStorage {
        root: root.clone(),
        channel: Arc::new(CommandChannel::new(store, host)),
    };

    if STORAGE.set(storage).is_ok() {
        info!(
            "event=ffi_storage_configured module=ffi status=ok root={}",
            root.display()
        );
        return Ok(());
    }
    match STORAGE.get() {
        Some(active) => ensure_same_root(active, &root),
        None => Err("storage configuration was lost".to_string()),
    }
}

fn ensure_same_root(active: &ConfiguredStorage, requested: &Path) -> Result<(), String> {
    if active.root == requested {
        return Ok(());
    }
    Err(format!(
        "storage already configured at `{}`; refusing to switch to `{}`",
        active.root.display(),
        requested.display()
    ))
}

fn parse_args(args_json: &str) -> Result<Vec<Value>, String> {
    let trimmed = args_json.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(values)) => Ok(values),
        Ok(_) => Err("args_json must be a JSON array".to_string()),
        Err(err) => Err(format!("args_json is not valid JSON: {err}")),
    }
}

fn shared_runtime() -> Result<&'static Runtime, String> {
    RUNTIME
        .get_or_init(|| {
            Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("wisemap-ffi")
                .enable_all()
                .build()
                .map_err(|err| format!("failed to start async runtime: {err}"))
        })
        .as_ref()
        .map_err(Clone::clone)
}
