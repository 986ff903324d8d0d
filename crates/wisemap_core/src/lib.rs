//! Core domain logic for WiseMap.
//! This crate owns mindmap storage, the command channel, and the editor
//! persistence adapter. Presentation layers reach storage only through
//! `CommandChannel`.

pub mod channel;
pub mod config;
pub mod host;
pub mod logging;
pub mod markup;
pub mod metadata;
pub mod model;
pub mod persistence;
pub mod store;

pub use channel::{
    supported_command_strings, supported_notification_strings, ChannelCommand, ChannelError,
    ChannelResult, CommandChannel, Notification, NotificationHub, RawExportRequest, Subscription,
};
pub use config::{ConfigError, StorageConfig};
pub use host::{DirectoryHost, HostShell, SaveDialogRequest};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use markup::{MapDocument, MapElement, MapNode, MarkupError};
pub use metadata::{extract_title, UNTITLED};
pub use model::map::{MapId, MapMetadata};
pub use persistence::{
    EditLocks, MapPersistence, NoLocks, PersistenceError, PersistenceResult, SaveHandle,
    SaveOptions, SaveOutcome,
};
pub use store::{MapStore, StoreError, StoreResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
