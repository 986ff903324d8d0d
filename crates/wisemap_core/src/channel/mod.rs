//! Permission-checked command/notification channel.
//!
//! # Responsibility
//! - Be the only boundary through which the presentation layer reaches
//!   `MapStore`.
//! - Enforce the fixed command and notification allow-lists and each
//!   command's argument shape.
//!
//! # Invariants
//! - Unknown names and malformed arguments fail with `InvalidCommand` before
//!   any handler or storage call runs.
//! - Store errors propagate unchanged; the channel adds no failure modes of
//!   its own beyond allow-list and shape rejection.
//! - Each invocation is independent and completes before its result is
//!   returned.

use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod allow_list;
mod command_channel;
mod notifications;

pub use allow_list::{
    supported_command_strings, supported_notification_strings, ChannelCommand, Notification,
};
pub use command_channel::{CommandChannel, RawExportRequest};
pub use notifications::{NotificationHub, Subscription};

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel-level error.
#[derive(Debug)]
pub enum ChannelError {
    /// Name outside the allow-list, or arguments outside the command shape.
    InvalidCommand { name: String, reason: String },
    /// Error raised by the storage engine, passed through as-is.
    Store(StoreError),
}

impl ChannelError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCommand { .. } => "invalid_command",
            Self::Store(err) => err.kind(),
        }
    }

    pub fn is_invalid_command(&self) -> bool {
        matches!(self, Self::InvalidCommand { .. })
    }

    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(err) => Some(err),
            Self::InvalidCommand { .. } => None,
        }
    }
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCommand { name, reason } => {
                write!(f, "invalid channel command `{name}`: {reason}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ChannelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::InvalidCommand { .. } => None,
        }
    }
}

impl From<StoreError> for ChannelError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
