//! Core types for follower diffing.

pub mod identifier;
pub mod record;

pub use identifier::{Identifier, Snapshot};
pub use record::{
    AccountId, ImportId, FollowerStatus, FollowerRecord, EventKind, Event,
    SourceKind, ImportRecord, ImportMetadata, FollowerSummary,
};
