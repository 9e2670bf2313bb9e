//! Follower history storage backends.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::diff::DiffResult;
use crate::types::{
    AccountId, Event, FollowerRecord, FollowerSummary, ImportId, ImportMetadata, ImportRecord,
    Snapshot,
};

/// Trait for follower history storage backends.
///
/// Implementations must return results in a deterministic order and must
/// serialize `commit` per account.
#[async_trait]
pub trait FollowerStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Identifiers whose status is `current`; empty for an unknown account.
    async fn read_previous_snapshot(&self, account: &AccountId) -> Result<Snapshot, Self::Error>;

    /// Persist one import atomically.
    ///
    /// Upserts every identifier in `current` as `current` with `last_seen`
    /// stamped, marks every identifier in `diff.left` as `left`, appends one
    /// `follow` event per entered identifier and one `unfollow` event per left
    /// identifier, and records the import. Either all of it lands or none.
    ///
    /// Implementations must refuse with a conflict error when the account's
    /// live snapshot no longer has `meta.previous_fingerprint`.
    async fn commit(
        &self,
        account: &AccountId,
        diff: &DiffResult,
        current: &Snapshot,
        meta: ImportMetadata,
    ) -> Result<ImportId, Self::Error>;

    /// Events ordered by `happened_at`, then identifier; optionally one import only.
    async fn list_events(
        &self,
        account: &AccountId,
        import: Option<ImportId>,
    ) -> Result<Vec<Event>, Self::Error>;

    /// All follower records, ordered by identifier.
    async fn list_followers(&self, account: &AccountId) -> Result<Vec<FollowerRecord>, Self::Error>;

    /// Committed imports, oldest first.
    async fn list_imports(&self, account: &AccountId) -> Result<Vec<ImportRecord>, Self::Error>;

    /// Overview counts for an account.
    async fn summary(&self, account: &AccountId) -> Result<FollowerSummary, Self::Error>;

    /// Whether the backend is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }

    /// Whether an error is an optimistic-concurrency conflict.
    fn is_conflict(error: &Self::Error) -> bool;
}

pub use memory::{InMemoryFollowerStore, InMemoryStoreError};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresError, PostgresFollowerStore};
