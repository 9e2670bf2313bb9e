//! One import of one upload for one account.
//!
//! ```text
//! read previous → ingest (locate, parse, normalize, diff) → commit
//! ```
//!
//! The previous snapshot's fingerprint travels with the commit, so a
//! concurrent import for the same account surfaces as [`ImportError::Conflict`]
//! instead of committing a diff computed against a stale snapshot. Nothing is
//! retried; the caller decides whether to run the import again.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::archive::{ContentFormat, DataSource};
use crate::canonical::content_digest;
use crate::ingestor::{IngestError, IngestOutcome, Ingestor};
use crate::store::FollowerStore;
use crate::types::{AccountId, Identifier, ImportId, ImportMetadata, SourceKind};

/// Warning attached to reports built from a "following" file.
pub const DEGRADED_WARNING: &str =
    "No followers file was found; this import used a following list instead, \
     so the result shows who you follow rather than who follows you.";

/// Error type for imports.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Ingestion failed; nothing was written.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Another import for the account committed first; nothing was written.
    #[error("Another import for this account completed first; run the import again")]
    Conflict,
    /// Storage failed.
    #[error("Store error: {0}")]
    Store(String),
}

/// Summary of a committed import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Import identifier assigned by the store.
    pub import_id: ImportId,
    /// How the bytes were supplied.
    pub source_kind: SourceKind,
    /// Detected content format.
    pub format: ContentFormat,
    /// Entries the identifiers came from.
    pub entries: Vec<String>,
    /// Raw identifiers before normalization.
    pub raw_count: usize,
    /// Size of the new snapshot.
    pub current_count: usize,
    /// Identifiers that entered.
    pub entered: Vec<Identifier>,
    /// Identifiers that left.
    pub left: Vec<Identifier>,
    /// Whether a "following" file stood in for the followers file.
    pub degraded: bool,
    /// User-facing warning, present when degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Fingerprint of the new snapshot.
    pub snapshot_fingerprint: String,
}

impl ImportReport {
    fn new(import_id: ImportId, outcome: IngestOutcome) -> Self {
        let degraded = outcome.is_degraded();
        Self {
            import_id,
            source_kind: outcome.source_kind,
            format: outcome.format,
            raw_count: outcome.raw_count,
            current_count: outcome.current.len(),
            snapshot_fingerprint: outcome.current.fingerprint(),
            entered: outcome.diff.entered.into_iter().collect(),
            left: outcome.diff.left.into_iter().collect(),
            entries: outcome.entries,
            degraded,
            warning: degraded.then(|| DEGRADED_WARNING.to_string()),
        }
    }
}

/// Runs imports against a follower store.
pub struct Importer<S: FollowerStore> {
    store: Arc<S>,
    ingestor: Ingestor,
}

impl<S: FollowerStore> Clone for Importer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ingestor: self.ingestor.clone(),
        }
    }
}

impl<S: FollowerStore> Importer<S> {
    /// Create an importer.
    pub fn new(store: Arc<S>, ingestor: Ingestor) -> Self {
        Self { store, ingestor }
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the ingestor.
    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    /// Import one upload for one account.
    pub async fn run(
        &self,
        account: &AccountId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ImportReport, ImportError> {
        let source_digest = content_digest(&bytes);

        let previous = self
            .store
            .read_previous_snapshot(account)
            .await
            .map_err(|e| ImportError::Store(e.to_string()))?;
        let previous_fingerprint = previous.fingerprint();

        let outcome = self.ingestor.ingest_upload(file_name, bytes, &previous)?;

        let meta = ImportMetadata {
            source_kind: outcome.source_kind,
            source_digest,
            degraded: outcome.source == DataSource::FollowingFallback,
            previous_fingerprint,
            imported_at: Utc::now(),
        };

        let import_id = self
            .store
            .commit(account, &outcome.diff, &outcome.current, meta)
            .await
            .map_err(|e| {
                if S::is_conflict(&e) {
                    tracing::warn!(account = %account, error = %e, "Import lost a race");
                    ImportError::Conflict
                } else {
                    tracing::error!(account = %account, error = %e, "Import commit failed");
                    ImportError::Store(e.to_string())
                }
            })?;

        tracing::info!(
            account = %account,
            import_id = %import_id,
            entered = outcome.diff.entered.len(),
            left = outcome.diff.left.len(),
            degraded = outcome.is_degraded(),
            "Import committed"
        );

        Ok(ImportReport::new(import_id, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestor::FailureKind;
    use crate::store::InMemoryFollowerStore;
    use uuid::Uuid;

    fn importer() -> Importer<InMemoryFollowerStore> {
        Importer::new(Arc::new(InMemoryFollowerStore::new()), Ingestor::default())
    }

    fn account() -> AccountId {
        AccountId::new(Uuid::from_u128(42))
    }

    #[tokio::test]
    async fn test_two_imports_report_changes() {
        let importer = importer();
        importer
            .run(&account(), "followers.json", br#"[{"username":"a"},{"username":"b"}]"#.to_vec())
            .await
            .unwrap();

        let report = importer
            .run(&account(), "followers.csv", b"username\nb\nc\n".to_vec())
            .await
            .unwrap();

        assert_eq!(report.entered, vec![Identifier::parse("c").unwrap()]);
        assert_eq!(report.left, vec![Identifier::parse("a").unwrap()]);
        assert_eq!(report.current_count, 2);
        assert_eq!(report.source_kind, SourceKind::CsvFile);
        assert!(report.warning.is_none());
    }

    #[tokio::test]
    async fn test_failed_ingest_writes_nothing() {
        let importer = importer();
        let err = importer
            .run(&account(), "followers.json", b"{broken".to_vec())
            .await
            .unwrap_err();

        match err {
            ImportError::Ingest(e) => assert_eq!(e.kind(), FailureKind::MalformedInput),
            other => panic!("unexpected error: {other}"),
        }
        assert!(importer.store().list_imports(&account()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_digest() {
        let importer = importer();
        let bytes = br#"[{"username":"kim"}]"#.to_vec();
        let report = importer
            .run(&account(), "followers.json", bytes.clone())
            .await
            .unwrap();

        let imports = importer.store().list_imports(&account()).await.unwrap();
        assert_eq!(imports.len(), 1);
        assert!(!imports[0].degraded);
        assert_eq!(imports[0].source_digest, content_digest(&bytes));
        assert_eq!(imports[0].snapshot_fingerprint, report.snapshot_fingerprint);
    }

    #[cfg(feature = "zip")]
    #[tokio::test]
    async fn test_following_archive_is_degraded() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("connections/following.json", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(br#"[{"username":"kim"}]"#).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let importer = importer();
        let report = importer.run(&account(), "export.zip", bytes).await.unwrap();

        assert!(report.degraded);
        assert_eq!(report.source_kind, SourceKind::Archive);
        assert_eq!(report.warning.as_deref(), Some(DEGRADED_WARNING));
        assert!(importer.store().list_imports(&account()).await.unwrap()[0].degraded);
    }
}
