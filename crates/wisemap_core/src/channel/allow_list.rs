//! Fixed allow-lists for channel commands and notifications.
//!
//! Wire names are the exact strings the presentation layer sends; anything
//! else is rejected before dispatch.

/// Request/response command reachable from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelCommand {
    List,
    Load,
    Save,
    Create,
    Delete,
    Export,
    ExportRaw,
    GetStorageLocation,
    OpenExternal,
}

/// Wire name for `ChannelCommand::List`.
pub const COMMAND_LIST: &str = "mindmap:list";
/// Wire name for `ChannelCommand::Load`.
pub const COMMAND_LOAD: &str = "mindmap:load";
/// Wire name for `ChannelCommand::Save`.
pub const COMMAND_SAVE: &str = "mindmap:save";
/// Wire name for `ChannelCommand::Create`.
pub const COMMAND_CREATE: &str = "mindmap:create";
/// Wire name for `ChannelCommand::Delete`.
pub const COMMAND_DELETE: &str = "mindmap:delete";
/// Wire name for `ChannelCommand::Export`.
pub const COMMAND_EXPORT: &str = "mindmap:export";
/// Wire name for `ChannelCommand::ExportRaw`.
pub const COMMAND_EXPORT_RAW: &str = "dialog:save-file";
/// Wire name for `ChannelCommand::GetStorageLocation`.
pub const COMMAND_GET_STORAGE_LOCATION: &str = "app:get-storage-path";
/// Wire name for `ChannelCommand::OpenExternal`.
pub const COMMAND_OPEN_EXTERNAL: &str = "app:open-external";

const SUPPORTED_COMMAND_STRINGS: &[&str] = &[
    COMMAND_LIST,
    COMMAND_LOAD,
    COMMAND_SAVE,
    COMMAND_CREATE,
    COMMAND_DELETE,
    COMMAND_EXPORT,
    COMMAND_EXPORT_RAW,
    COMMAND_GET_STORAGE_LOCATION,
    COMMAND_OPEN_EXTERNAL,
];

impl ChannelCommand {
    /// Stable wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => COMMAND_LIST,
            Self::Load => COMMAND_LOAD,
            Self::Save => COMMAND_SAVE,
            Self::Create => COMMAND_CREATE,
            Self::Delete => COMMAND_DELETE,
            Self::Export => COMMAND_EXPORT,
            Self::ExportRaw => COMMAND_EXPORT_RAW,
            Self::GetStorageLocation => COMMAND_GET_STORAGE_LOCATION,
            Self::OpenExternal => COMMAND_OPEN_EXTERNAL,
        }
    }

    /// Resolves a wire name. Matching is exact: no trimming, no case folding.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            COMMAND_LIST => Some(Self::List),
            COMMAND_LOAD => Some(Self::Load),
            COMMAND_SAVE => Some(Self::Save),
            COMMAND_CREATE => Some(Self::Create),
            COMMAND_DELETE => Some(Self::Delete),
            COMMAND_EXPORT => Some(Self::Export),
            COMMAND_EXPORT_RAW => Some(Self::ExportRaw),
            COMMAND_GET_STORAGE_LOCATION => Some(Self::GetStorageLocation),
            COMMAND_OPEN_EXTERNAL => Some(Self::OpenExternal),
            _ => None,
        }
    }

    /// Whether the command can change files on disk.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::Save | Self::Create | Self::Delete | Self::Export | Self::ExportRaw
        )
    }
}

/// Returns every allowed command wire name.
pub fn supported_command_strings() -> &'static [&'static str] {
    SUPPORTED_COMMAND_STRINGS
}

/// Privileged-side signal the presentation layer may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Notification {
    NewDocumentRequested,
    SaveRequested,
}

/// Wire name for `Notification::NewDocumentRequested`.
pub const NOTIFICATION_NEW_DOCUMENT: &str = "menu:new-mindmap";
/// Wire name for `Notification::SaveRequested`.
pub const NOTIFICATION_SAVE: &str = "menu:save";

const SUPPORTED_NOTIFICATION_STRINGS: &[&str] = &[NOTIFICATION_NEW_DOCUMENT, NOTIFICATION_SAVE];

impl Notification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewDocumentRequested => NOTIFICATION_NEW_DOCUMENT,
            Self::SaveRequested => NOTIFICATION_SAVE,
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            NOTIFICATION_NEW_DOCUMENT => Some(Self::NewDocumentRequested),
            NOTIFICATION_SAVE => Some(Self::SaveRequested),
            _ => None,
        }
    }
}

/// Returns every allowed notification wire name.
pub fn supported_notification_strings() -> &'static [&'static str] {
    SUPPORTED_NOTIFICATION_STRINGS
}

#[cfg(test)]
mod tests {
    use super::{
        supported_command_strings, supported_notification_strings, ChannelCommand, Notification,
    };

    #[test]
    fn every_supported_command_roundtrips() {
        for name in supported_command_strings() {
            let command = ChannelCommand::from_wire(name).expect("listed command parses");
            assert_eq!(command.as_str(), *name);
        }
        assert_eq!(supported_command_strings().len(), 9);
    }

    #[test]
    fn rejects_unlisted_and_near_miss_commands() {
        for name in [
            "mindmap:import",
            "MINDMAP:LIST",
            " mindmap:list",
            "fs:read",
            "",
            "menu:save",
        ] {
            assert_eq!(ChannelCommand::from_wire(name), None, "{name}");
        }
    }

    #[test]
    fn notification_and_command_lists_are_disjoint() {
        for name in supported_notification_strings() {
            assert!(Notification::from_wire(name).is_some());
            assert!(ChannelCommand::from_wire(name).is_none());
        }
        for name in supported_command_strings() {
            assert!(Notification::from_wire(name).is_none());
        }
    }

    #[test]
    fn mutating_flag_covers_write_paths_only() {
        assert!(ChannelCommand::Save.is_mutating());
        assert!(ChannelCommand::ExportRaw.is_mutating());
        assert!(!ChannelCommand::List.is_mutating());
        assert!(!ChannelCommand::OpenExternal.is_mutating());
    }
}
