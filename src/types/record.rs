//! Persisted record types owned by the storage collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::identifier::Identifier;

/// Owning account of a follower history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Create a new AccountId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse an AccountId from a UUID string.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AccountId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier of one committed import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImportId(Uuid);

impl ImportId {
    /// Create a new ImportId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random ImportId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an ImportId from a UUID string.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Liveness of a follower record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowerStatus {
    /// Present in the latest import.
    Current,
    /// Was present before, absent from the latest import.
    Left,
}

impl FollowerStatus {
    /// Parse status from its storage string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "current" => Some(Self::Current),
            "left" => Some(Self::Left),
            _ => None,
        }
    }

    /// Storage string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Left => "left",
        }
    }
}

impl fmt::Display for FollowerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// History row for one identifier. Never deleted; only its status moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerRecord {
    /// The follower.
    pub identifier: Identifier,
    /// First import that saw this identifier.
    pub first_seen: DateTime<Utc>,
    /// Last import that touched this identifier.
    pub last_seen: DateTime<Utc>,
    /// Current liveness.
    pub status: FollowerStatus,
}

/// Direction of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Identifier entered the snapshot.
    Follow,
    /// Identifier left the snapshot.
    Unfollow,
}

impl EventKind {
    /// Parse kind from its storage string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "follow" => Some(Self::Follow),
            "unfollow" => Some(Self::Unfollow),
            _ => None,
        }
    }

    /// Storage string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only log entry produced by one import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier that entered or left.
    pub identifier: Identifier,
    /// Direction.
    pub kind: EventKind,
    /// Import time of the producing import.
    pub happened_at: DateTime<Utc>,
    /// Producing import.
    pub import_id: ImportId,
}

/// How the import's bytes reached the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A compressed export archive.
    Archive,
    /// A loose JSON file.
    JsonFile,
    /// A loose CSV file.
    CsvFile,
}

impl SourceKind {
    /// Parse kind from its storage string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "archive" => Some(Self::Archive),
            "json_file" => Some(Self::JsonFile),
            "csv_file" => Some(Self::CsvFile),
            _ => None,
        }
    }

    /// Storage string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::JsonFile => "json_file",
            Self::CsvFile => "csv_file",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed ingestion operation; parent of its events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Import identifier.
    pub id: ImportId,
    /// Upload kind.
    pub source_kind: SourceKind,
    /// Commit time.
    pub imported_at: DateTime<Utc>,
    /// SHA-256 of the uploaded bytes (hex).
    pub source_digest: String,
    /// Whether the snapshot came from a "following" fallback file.
    pub degraded: bool,
    /// Fingerprint of the snapshot this import produced.
    pub snapshot_fingerprint: String,
}

/// Metadata the caller hands to `FollowerStore::commit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMetadata {
    /// Upload kind.
    pub source_kind: SourceKind,
    /// SHA-256 of the uploaded bytes (hex).
    pub source_digest: String,
    /// Whether the snapshot came from a "following" fallback file.
    pub degraded: bool,
    /// Fingerprint of the previous snapshot the diff was computed against.
    pub previous_fingerprint: String,
    /// Import time, stamped on records and events.
    pub imported_at: DateTime<Utc>,
}

/// Counts shown on an account overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerSummary {
    /// Records with status `current`.
    pub current: usize,
    /// Records with status `left`.
    pub left: usize,
    /// Follow events across all imports.
    pub follows: usize,
    /// Unfollow events across all imports.
    pub unfollows: usize,
    /// Committed imports.
    pub imports: usize,
}
