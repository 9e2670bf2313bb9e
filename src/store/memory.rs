//! In-memory follower store for testing and single-process use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::FollowerStore;
use crate::diff::DiffResult;
use crate::types::{
    AccountId, Event, EventKind, FollowerRecord, FollowerStatus, FollowerSummary, Identifier,
    ImportId, ImportMetadata, ImportRecord, Snapshot,
};

/// Error type for in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryStoreError {
    /// The live snapshot changed since the caller read it.
    #[error("Import conflict for account {account}: expected snapshot {expected}, found {actual}")]
    Conflict {
        /// Account being committed.
        account: AccountId,
        /// Fingerprint the caller diffed against.
        expected: String,
        /// Fingerprint of the live snapshot.
        actual: String,
    },
}

#[derive(Debug, Default)]
struct AccountHistory {
    followers: BTreeMap<Identifier, FollowerRecord>,
    events: Vec<Event>,
    imports: Vec<ImportRecord>,
}

impl AccountHistory {
    fn live_snapshot(&self) -> Snapshot {
        self.followers
            .values()
            .filter(|r| r.status == FollowerStatus::Current)
            .map(|r| r.identifier.clone())
            .collect()
    }

    fn apply(
        &mut self,
        id: ImportId,
        diff: &DiffResult,
        current: &Snapshot,
        meta: &ImportMetadata,
    ) {
        let at = meta.imported_at;

        for identifier in current {
            self.followers
                .entry(identifier.clone())
                .and_modify(|r| {
                    r.last_seen = at;
                    r.status = FollowerStatus::Current;
                })
                .or_insert_with(|| FollowerRecord {
                    identifier: identifier.clone(),
                    first_seen: at,
                    last_seen: at,
                    status: FollowerStatus::Current,
                });
        }

        for identifier in &diff.left {
            if let Some(record) = self.followers.get_mut(identifier) {
                record.last_seen = at;
                record.status = FollowerStatus::Left;
            }
        }

        let mut events: Vec<Event> = diff
            .entered
            .iter()
            .map(|i| event(i, EventKind::Follow, at, id))
            .chain(diff.left.iter().map(|i| event(i, EventKind::Unfollow, at, id)))
            .collect();
        events.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        self.events.extend(events);

        self.imports.push(ImportRecord {
            id,
            source_kind: meta.source_kind,
            imported_at: at,
            source_digest: meta.source_digest.clone(),
            degraded: meta.degraded,
            snapshot_fingerprint: current.fingerprint(),
        });
    }
}

fn event(identifier: &Identifier, kind: EventKind, at: DateTime<Utc>, import_id: ImportId) -> Event {
    Event {
        identifier: identifier.clone(),
        kind,
        happened_at: at,
        import_id,
    }
}

/// In-memory follower store.
///
/// A single lock guards every account, which serializes commits per account
/// (and across accounts). Uses BTreeMap for deterministic iteration order.
#[derive(Debug, Default)]
pub struct InMemoryFollowerStore {
    accounts: Mutex<BTreeMap<AccountId, AccountHistory>>,
}

impl InMemoryFollowerStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts with any history.
    pub fn num_accounts(&self) -> usize {
        self.accounts.lock().len()
    }
}

#[async_trait]
impl FollowerStore for InMemoryFollowerStore {
    type Error = InMemoryStoreError;

    async fn read_previous_snapshot(&self, account: &AccountId) -> Result<Snapshot, Self::Error> {
        Ok(self
            .accounts
            .lock()
            .get(account)
            .map(AccountHistory::live_snapshot)
            .unwrap_or_default())
    }

    async fn commit(
        &self,
        account: &AccountId,
        diff: &DiffResult,
        current: &Snapshot,
        meta: ImportMetadata,
    ) -> Result<ImportId, Self::Error> {
        let mut accounts = self.accounts.lock();
        let history = accounts.entry(*account).or_default();

        let actual = history.live_snapshot().fingerprint();
        if actual != meta.previous_fingerprint {
            return Err(InMemoryStoreError::Conflict {
                account: *account,
                expected: meta.previous_fingerprint,
                actual,
            });
        }

        let id = ImportId::generate();
        history.apply(id, diff, current, &meta);

        tracing::debug!(
            account = %account,
            import_id = %id,
            entered = diff.entered.len(),
            left = diff.left.len(),
            "Committed import"
        );

        Ok(id)
    }

    async fn list_events(
        &self,
        account: &AccountId,
        import: Option<ImportId>,
    ) -> Result<Vec<Event>, Self::Error> {
        let accounts = self.accounts.lock();
        let Some(history) = accounts.get(account) else {
            return Ok(Vec::new());
        };

        let mut events: Vec<Event> = history
            .events
            .iter()
            .filter(|e| import.map_or(true, |id| e.import_id == id))
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.happened_at
                .cmp(&b.happened_at)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        Ok(events)
    }

    async fn list_followers(&self, account: &AccountId) -> Result<Vec<FollowerRecord>, Self::Error> {
        Ok(self
            .accounts
            .lock()
            .get(account)
            .map(|h| h.followers.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_imports(&self, account: &AccountId) -> Result<Vec<ImportRecord>, Self::Error> {
        let mut imports = self
            .accounts
            .lock()
            .get(account)
            .map(|h| h.imports.clone())
            .unwrap_or_default();
        imports.sort_by_key(|i| i.imported_at);
        Ok(imports)
    }

    async fn summary(&self, account: &AccountId) -> Result<FollowerSummary, Self::Error> {
        let accounts = self.accounts.lock();
        let Some(history) = accounts.get(account) else {
            return Ok(FollowerSummary::default());
        };

        let mut summary = FollowerSummary {
            imports: history.imports.len(),
            ..FollowerSummary::default()
        };
        for record in history.followers.values() {
            match record.status {
                FollowerStatus::Current => summary.current += 1,
                FollowerStatus::Left => summary.left += 1,
            }
        }
        for event in &history.events {
            match event.kind {
                EventKind::Follow => summary.follows += 1,
                EventKind::Unfollow => summary.unfollows += 1,
            }
        }
        Ok(summary)
    }

    fn is_conflict(error: &Self::Error) -> bool {
        matches!(error, InMemoryStoreError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::normalize::normalize;
    use crate::types::SourceKind;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn account() -> AccountId {
        AccountId::new(Uuid::from_u128(7))
    }

    fn meta(previous: &Snapshot, secs: i64) -> ImportMetadata {
        ImportMetadata {
            source_kind: SourceKind::JsonFile,
            source_digest: "digest".to_string(),
            degraded: false,
            previous_fingerprint: previous.fingerprint(),
            imported_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    async fn import(store: &InMemoryFollowerStore, ids: &[&str], secs: i64) -> ImportId {
        let previous = store.read_previous_snapshot(&account()).await.unwrap();
        let current = normalize(ids.iter().copied());
        let d = diff(&previous, &current);
        store
            .commit(&account(), &d, &current, meta(&previous, secs))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_account_is_empty() {
        let store = InMemoryFollowerStore::new();
        assert!(store.read_previous_snapshot(&account()).await.unwrap().is_empty());
        assert_eq!(store.summary(&account()).await.unwrap(), FollowerSummary::default());
    }

    #[tokio::test]
    async fn test_first_import_records_follows() {
        let store = InMemoryFollowerStore::new();
        import(&store, &["b", "a"], 0).await;

        let events = store.list_events(&account(), None).await.unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(events.iter().all(|e| e.kind == EventKind::Follow));
    }

    #[tokio::test]
    async fn test_second_import_marks_left_and_keeps_history() {
        let store = InMemoryFollowerStore::new();
        import(&store, &["a", "b", "c"], 0).await;
        let second = import(&store, &["b", "c", "d"], 60).await;

        let snapshot = store.read_previous_snapshot(&account()).await.unwrap();
        assert_eq!(snapshot, normalize(["b", "c", "d"]));

        let followers = store.list_followers(&account()).await.unwrap();
        assert_eq!(followers.len(), 4);
        let a = &followers[0];
        assert_eq!(a.identifier.as_str(), "a");
        assert_eq!(a.status, FollowerStatus::Left);
        assert!(a.last_seen > a.first_seen);

        let events = store.list_events(&account(), Some(second)).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].identifier.as_str(), "a");
        assert_eq!(events[0].kind, EventKind::Unfollow);
        assert_eq!(events[1].identifier.as_str(), "d");
        assert_eq!(events[1].kind, EventKind::Follow);

        let summary = store.summary(&account()).await.unwrap();
        assert_eq!(summary.current, 3);
        assert_eq!(summary.left, 1);
        assert_eq!(summary.follows, 4);
        assert_eq!(summary.unfollows, 1);
        assert_eq!(summary.imports, 2);
    }

    #[tokio::test]
    async fn test_rejoin_moves_back_to_current() {
        let store = InMemoryFollowerStore::new();
        import(&store, &["a"], 0).await;
        import(&store, &[], 60).await;
        import(&store, &["a"], 120).await;

        let followers = store.list_followers(&account()).await.unwrap();
        assert_eq!(followers[0].status, FollowerStatus::Current);
        assert_eq!(store.list_events(&account(), None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stale_commit_conflicts() {
        let store = InMemoryFollowerStore::new();
        let stale = store.read_previous_snapshot(&account()).await.unwrap();
        import(&store, &["a"], 0).await;

        let current = normalize(["b"]);
        let d = diff(&stale, &current);
        let err = store
            .commit(&account(), &d, &current, meta(&stale, 60))
            .await
            .unwrap_err();

        assert!(InMemoryFollowerStore::is_conflict(&err));
        assert_eq!(store.list_imports(&account()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_import_writes_no_events() {
        let store = InMemoryFollowerStore::new();
        import(&store, &["a"], 0).await;
        let second = import(&store, &["A "], 60).await;

        assert!(store.list_events(&account(), Some(second)).await.unwrap().is_empty());
        assert_eq!(store.list_imports(&account()).await.unwrap().len(), 2);
    }
}
