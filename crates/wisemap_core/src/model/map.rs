//! Mindmap identity and metadata records.
//!
//! # Responsibility
//! - Provide the `MapId` newtype used by every storage path.
//! - Define the advisory metadata record returned by listings.
//!
//! # Invariants
//! - `MapId` is a random v4 UUID; it is never reused for another document.
//! - `MapId` text form is hyphenated lowercase, which is also the file stem.
//! - Metadata records are derived snapshots and may go stale.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// File extension of the native document format.
pub const MAP_FILE_EXTENSION: &str = "wxml";

/// Stable identifier for one stored mindmap.
///
/// Parsing from text only accepts UUIDs, so an id can never smuggle path
/// separators into a storage path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(Uuid);

impl MapId {
    /// Generates a fresh collision-resistant id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// File name used for this document inside the storage root.
    pub fn file_name(&self) -> String {
        format!("{}.{MAP_FILE_EXTENSION}", self.0.hyphenated())
    }

    /// Recovers an id from a storage file name (`<uuid>.wxml`).
    ///
    /// Only the canonical spelling produced by `file_name` is accepted, so
    /// every listed id maps back to the file it was read from. Returns `None`
    /// for anything else, including uppercase or unhyphenated stems.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(MAP_FILE_EXTENSION)?.strip_suffix('.')?;
        let id: Self = stem.parse().ok()?;
        (id.file_name() == name).then_some(id)
    }
}

impl Display for MapId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for MapId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

/// Listing record for one stored mindmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapMetadata {
    /// Stable document id.
    pub id: MapId,
    /// Title extracted from content at listing time (advisory).
    pub title: String,
    /// File birth time in epoch milliseconds, or `modified` where the
    /// filesystem reports none.
    ///
    /// Atomic saves replace the file, so under `atomic_writes` this is the
    /// time of the latest full rewrite. In-place saves keep the original
    /// birth time.
    pub created: i64,
    /// File modification time in epoch milliseconds.
    pub modified: i64,
    /// Absolute path of the backing file.
    pub location: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::{MapId, MAP_FILE_EXTENSION};

    #[test]
    fn file_name_roundtrips_through_id() {
        let id = MapId::generate();
        let name = id.file_name();
        assert!(name.ends_with(".wxml"));
        assert_eq!(MapId::from_file_name(&name), Some(id));
    }

    #[test]
    fn from_file_name_rejects_foreign_files() {
        assert_eq!(MapId::from_file_name("notes.txt"), None);
        assert_eq!(MapId::from_file_name("budget.wxml"), None);
        assert_eq!(MapId::from_file_name(MAP_FILE_EXTENSION), None);
        let id = MapId::generate();
        assert_eq!(MapId::from_file_name(&format!(".{id}.wxml.abc.tmp")), None);
    }

    #[test]
    fn from_file_name_accepts_only_the_canonical_spelling() {
        let id: MapId = "6f9619ff-8b86-d011-b42d-00c04fc964ff".parse().unwrap();
        assert_eq!(
            MapId::from_file_name("6f9619ff-8b86-d011-b42d-00c04fc964ff.wxml"),
            Some(id)
        );
        for alias in [
            "6F9619FF-8B86-D011-B42D-00C04FC964FF.wxml",
            "6f9619ff8b86d011b42d00c04fc964ff.wxml",
            "{6f9619ff-8b86-d011-b42d-00c04fc964ff}.wxml",
            "urn:uuid:6f9619ff-8b86-d011-b42d-00c04fc964ff.wxml",
            " 6f9619ff-8b86-d011-b42d-00c04fc964ff.wxml",
        ] {
            assert_eq!(MapId::from_file_name(alias), None, "{alias}");
        }
    }

    #[test]
    fn parse_rejects_path_like_values() {
        assert!("../../etc/passwd".parse::<MapId>().is_err());
        assert!("".parse::<MapId>().is_err());
    }

    #[test]
    fn display_is_lowercase_hyphenated() {
        let id: MapId = "6F9619FF-8B86-D011-B42D-00C04FC964FF".parse().unwrap();
        assert_eq!(id.to_string(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
    }
}
