//! Command dispatch from wire names to store and host calls.

use super::allow_list::{ChannelCommand, Notification};
use super::notifications::{NotificationHub, Subscription};
use super::{ChannelError, ChannelResult};
use crate::host::{HostShell, SaveDialogRequest};
use crate::model::map::{MapId, MapMetadata};
use crate::store::{MapStore, StoreError};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

const OPEN_EXTERNAL_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Argument object of `dialog:save-file`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawExportRequest {
    /// Converter output bytes.
    pub content: Vec<u8>,
    /// Suggested file name.
    pub name: String,
    /// File extension without leading dot.
    pub extension: String,
}

/// Allow-listed gateway between the presentation layer and the store.
pub struct CommandChannel {
    store: Arc<MapStore>,
    host: Arc<dyn HostShell>,
    notifications: NotificationHub,
}

impl CommandChannel {
    pub fn new(store: Arc<MapStore>, host: Arc<dyn HostShell>) -> Self {
        Self {
            store,
            host,
            notifications: NotificationHub::new(),
        }
    }

    /// Invokes one allow-listed command with positional JSON arguments.
    ///
    /// # Errors
    /// - `InvalidCommand` for unknown names or malformed arguments; nothing
    ///   reaches the store in that case.
    /// - `Store(..)` with the storage engine's error, unchanged.
    pub async fn invoke(&self, command: &str, args: Vec<Value>) -> ChannelResult<Value> {
        let Some(parsed) = ChannelCommand::from_wire(command) else {
            warn!(
                "event=channel_invoke module=channel status=rejected command={:?} reason=not_allowed",
                command
            );
            return Err(ChannelError::invalid(command, "command is not allow-listed"));
        };

        let started_at = Instant::now();
        let result = self.dispatch(parsed, args).await;
        match &result {
            Ok(_) if parsed.is_mutating() => info!(
                "event=channel_invoke module=channel status=ok command={} duration_ms={}",
                parsed.as_str(),
                started_at.elapsed().as_millis()
            ),
            Ok(_) => debug!(
                "event=channel_invoke module=channel status=ok command={} duration_ms={}",
                parsed.as_str(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=channel_invoke module=channel status=error command={} error_kind={} error={}",
                parsed.as_str(),
                err.kind(),
                err
            ),
        }
        result
    }

    /// Subscribes `handler` to an allow-listed notification.
    ///
    /// # Errors
    /// - `InvalidCommand` when `notification` is not allow-listed.
    pub fn subscribe(
        &self,
        notification: &str,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> ChannelResult<Subscription> {
        let Some(parsed) = Notification::from_wire(notification) else {
            warn!(
                "event=channel_subscribe module=channel status=rejected notification={:?}",
                notification
            );
            return Err(ChannelError::invalid(
                notification,
                "notification is not allow-listed",
            ));
        };
        Ok(self.notifications.subscribe(parsed, handler))
    }

    /// Privileged-side emission (menu accelerators and the like).
    pub fn notify(&self, notification: Notification) -> usize {
        self.notifications.emit(notification)
    }

    pub fn notifications(&self) -> &NotificationHub {
        &self.notifications
    }

    pub fn storage_location(&self) -> &Path {
        self.store.storage_location()
    }

    async fn dispatch(&self, command: ChannelCommand, args: Vec<Value>) -> ChannelResult<Value> {
        let args = Args::new(command, args);
        match command {
            ChannelCommand::List => {
                args.expect_arity(0, 0)?;
                let records = self.store.list().await?;
                Ok(Value::Array(records.iter().map(metadata_to_json).collect()))
            }
            ChannelCommand::Load => {
                args.expect_arity(1, 1)?;
                let id = args.map_id(0)?;
                Ok(Value::String(self.store.load(id).await?))
            }
            ChannelCommand::Save => {
                args.expect_arity(2, 3)?;
                let id = args.map_id(0)?;
                let content: String = args.required(1)?;
                // Title hint is advisory; the stored title always comes from content.
                let _title_hint: Option<String> = args.optional(2)?;
                self.store.save(id, &content).await?;
                Ok(Value::Null)
            }
            ChannelCommand::Create => {
                args.expect_arity(1, 1)?;
                let title: String = args.required(0)?;
                let id = self.store.create(&title).await?;
                Ok(Value::String(id.to_string()))
            }
            ChannelCommand::Delete => {
                args.expect_arity(1, 1)?;
                let id = args.map_id(0)?;
                self.store.delete(id).await?;
                Ok(Value::Null)
            }
            ChannelCommand::Export => {
                args.expect_arity(1, 2)?;
                let id = args.map_id(0)?;
                let title_hint: Option<String> = args.optional(1)?;
                if !self.store.contains(id).await? {
                    return Err(StoreError::NotFound(id).into());
                }
                let request = SaveDialogRequest::for_map_export(title_hint.as_deref());
                let Some(destination) = self.host.choose_save_path(request).await else {
                    return Ok(Value::Bool(false));
                };
                self.store.export_to(id, &destination).await?;
                Ok(Value::Bool(true))
            }
            ChannelCommand::ExportRaw => {
                args.expect_arity(1, 1)?;
                let request: RawExportRequest = args.required(0)?;
                let dialog = SaveDialogRequest::for_raw_export(&request.name, &request.extension);
                let Some(destination) = self.host.choose_save_path(dialog).await else {
                    return Ok(Value::Bool(false));
                };
                self.store
                    .write_external(&destination, &request.content)
                    .await?;
                Ok(Value::Bool(true))
            }
            ChannelCommand::GetStorageLocation => {
                args.expect_arity(0, 0)?;
                Ok(Value::String(
                    self.store.storage_location().to_string_lossy().into_owned(),
                ))
            }
            ChannelCommand::OpenExternal => {
                args.expect_arity(1, 1)?;
                let raw: String = args.required(0)?;
                match Url::parse(&raw) {
                    Ok(url) if OPEN_EXTERNAL_SCHEMES.contains(&url.scheme()) => {
                        self.host.open_external(url.as_str()).await;
                    }
                    _ => warn!(
                        "event=open_external module=channel status=skip reason=unsupported_url url={:?}",
                        raw
                    ),
                }
                Ok(Value::Null)
            }
        }
    }
}

fn metadata_to_json(record: &MapMetadata) -> Value {
    json!({
        "id": record.id.to_string(),
        "title": record.title,
        "created": record.created,
        "modified": record.modified,
        "location": record.location.to_string_lossy(),
    })
}

/// Positional argument reader bound to one command.
struct Args {
    command: ChannelCommand,
    values: Vec<Value>,
}

impl Args {
    fn new(command: ChannelCommand, values: Vec<Value>) -> Self {
        Self { command, values }
    }

    fn invalid(&self, reason: impl Into<String>) -> ChannelError {
        ChannelError::invalid(self.command.as_str(), reason)
    }

    fn expect_arity(&self, min: usize, max: usize) -> ChannelResult<()> {
        let len = self.values.len();
        if len < min || len > max {
            let expected = if min == max {
                format!("{min}")
            } else {
                format!("{min}..={max}")
            };
            return Err(self.invalid(format!("expected {expected} argument(s), got {len}")));
        }
        Ok(())
    }

    fn required<T: DeserializeOwned>(&self, index: usize) -> ChannelResult<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| self.invalid(format!("missing argument {index}")))?;
        T::deserialize(value)
            .map_err(|err| self.invalid(format!("argument {index} is malformed: {err}")))
    }

    fn optional<T: DeserializeOwned>(&self, index: usize) -> ChannelResult<Option<T>> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.required(index).map(Some),
        }
    }

    fn map_id(&self, index: usize) -> ChannelResult<MapId> {
        let raw: String = self.required(index)?;
        raw.parse::<MapId>()
            .map_err(|_| self.invalid(format!("argument {index} is not a mindmap id")))
    }
}
