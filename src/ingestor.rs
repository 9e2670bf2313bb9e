//! Ingestion orchestrator.
//!
//! Sequences the pure stages into one operation:
//!
//! ```text
//! Idle → Locating → Parsing → Normalizing → Diffing → Done
//!            ↓          ↓
//!         Failed     Failed
//! ```
//!
//! Only locating and parsing can fail; normalization and diffing accept any
//! input. Nothing is retried and nothing is persisted here: the caller gets
//! the new snapshot and the diff and hands them to a
//! [`FollowerStore`](crate::store::FollowerStore).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::archive::{locate, Bundle, ContentFormat, DataSource, LocateError, RawEntry};
use crate::config::IngestConfig;
use crate::diff::{diff, DiffResult};
use crate::normalize::normalize;
use crate::parser::{parse, ParseError};
use crate::types::{Snapshot, SourceKind};

#[cfg(feature = "zip")]
use crate::zip_bundle::{read_archive, ZipBundleError};

/// Stage of one ingestion operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    /// Not started.
    Idle,
    /// Finding follower data in the bundle.
    Locating,
    /// Extracting raw identifiers.
    Parsing,
    /// Canonicalizing identifiers.
    Normalizing,
    /// Computing entered/left.
    Diffing,
    /// Finished successfully.
    Done,
    /// Stopped with a classified failure.
    Failed(FailureKind),
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Locating => write!(f, "locating"),
            Self::Parsing => write!(f, "parsing"),
            Self::Normalizing => write!(f, "normalizing"),
            Self::Diffing => write!(f, "diffing"),
            Self::Done => write!(f, "done"),
            Self::Failed(kind) => write!(f, "failed({})", kind),
        }
    }
}

/// Classified failure of an ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No recognizable follower data in the bundle.
    NotFound,
    /// Loose file with an unrecognized extension.
    UnsupportedFormat,
    /// Matched data could not be read as its declared format.
    MalformedInput,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::UnsupportedFormat => write!(f, "unsupported_format"),
            Self::MalformedInput => write!(f, "malformed_input"),
        }
    }
}

/// Error type for ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Locating follower data failed.
    #[error(transparent)]
    Locate(#[from] LocateError),
    /// A located entry could not be parsed.
    #[error("{entry}: {source}")]
    Parse {
        /// Entry that failed.
        entry: String,
        /// Underlying parse error.
        #[source]
        source: ParseError,
    },
    /// The uploaded archive could not be decoded.
    #[cfg(feature = "zip")]
    #[error(transparent)]
    Archive(#[from] ZipBundleError),
}

impl IngestError {
    /// Taxonomy bucket of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Locate(LocateError::NotFound { .. }) => FailureKind::NotFound,
            Self::Locate(LocateError::UnsupportedFormat { .. }) => FailureKind::UnsupportedFormat,
            Self::Parse { .. } => FailureKind::MalformedInput,
            #[cfg(feature = "zip")]
            Self::Archive(_) => FailureKind::MalformedInput,
        }
    }

    /// Stage at which the failure was detected.
    pub fn stage(&self) -> IngestStage {
        match self {
            Self::Parse { .. } => IngestStage::Parsing,
            _ => IngestStage::Locating,
        }
    }

    /// What the user can do about it.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            FailureKind::NotFound => {
                "No follower list was found. The platform's export layout may have changed, \
                 or this is not the expected export."
            }
            FailureKind::UnsupportedFormat => {
                "Unsupported file type. Upload the export as .zip, .json or .csv."
            }
            FailureKind::MalformedInput => {
                "The follower file could not be read. Try downloading a fresh export."
            }
        }
    }
}

/// Result of one successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// Snapshot extracted from the bundle.
    pub current: Snapshot,
    /// Partition against the previous snapshot.
    pub diff: DiffResult,
    /// Which question the data answers; `FollowingFallback` is a degraded result.
    pub source: DataSource,
    /// Detected content format.
    pub format: ContentFormat,
    /// How the bytes were supplied.
    pub source_kind: SourceKind,
    /// Entries the identifiers came from.
    pub entries: Vec<String>,
    /// Raw identifiers extracted before normalization.
    pub raw_count: usize,
}

impl IngestOutcome {
    /// Whether identifiers came from a "following" fallback file.
    pub fn is_degraded(&self) -> bool {
        self.source.is_degraded()
    }

    /// Whether a located file produced no identifiers at all.
    ///
    /// Not an error, but callers usually want to confirm before committing
    /// a diff where everyone left.
    pub fn is_empty_extraction(&self) -> bool {
        self.current.is_empty()
    }
}

/// Runs ingestions with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    config: IngestConfig,
}

impl Ingestor {
    /// Create an ingestor with the given configuration.
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Create an ingestor from environment variables.
    pub fn from_env() -> Self {
        Self::new(IngestConfig::from_env())
    }

    /// Get the configuration.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Classify an upload: `.zip` becomes an archive, anything else a loose file.
    pub fn bundle_from_upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<Bundle, IngestError> {
        if !file_name.to_ascii_lowercase().ends_with(".zip") {
            return Ok(Bundle::File(RawEntry::new(file_name, bytes)));
        }

        #[cfg(feature = "zip")]
        {
            Ok(read_archive(&bytes, &self.config)?)
        }
        #[cfg(not(feature = "zip"))]
        {
            drop(bytes);
            Err(LocateError::UnsupportedFormat {
                file_name: file_name.to_string(),
            }
            .into())
        }
    }

    /// Ingest an upload by file name and bytes.
    pub fn ingest_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        previous: &Snapshot,
    ) -> Result<IngestOutcome, IngestError> {
        let span = tracing::info_span!("ingest_upload", file_name = %file_name, bytes = bytes.len());
        let _guard = span.enter();

        let bundle = self.bundle_from_upload(file_name, bytes).map_err(|e| {
            tracing::warn!(kind = %e.kind(), error = %e, "Upload rejected");
            e
        })?;
        self.ingest(bundle, previous)
    }

    /// Ingest a bundle against the previous snapshot.
    pub fn ingest(&self, bundle: Bundle, previous: &Snapshot) -> Result<IngestOutcome, IngestError> {
        let span = tracing::info_span!("ingest", previous = previous.len());
        let _guard = span.enter();

        let mut run = StageTracker::default();
        let result = self.run(&mut run, bundle, previous);

        match &result {
            Ok(outcome) => {
                run.advance(IngestStage::Done);
                if outcome.is_degraded() {
                    tracing::warn!(
                        entries = ?outcome.entries,
                        "No followers file found; using a following list instead (degraded result)"
                    );
                }
                tracing::info!(
                    current = outcome.current.len(),
                    raw = outcome.raw_count,
                    entered = outcome.diff.entered.len(),
                    left = outcome.diff.left.len(),
                    degraded = outcome.is_degraded(),
                    "Ingestion complete"
                );
            }
            Err(e) => {
                run.advance(IngestStage::Failed(e.kind()));
                tracing::warn!(kind = %e.kind(), stage = %e.stage(), error = %e, "Ingestion failed");
            }
        }

        result
    }

    fn run(
        &self,
        run: &mut StageTracker,
        bundle: Bundle,
        previous: &Snapshot,
    ) -> Result<IngestOutcome, IngestError> {
        run.advance(IngestStage::Locating);
        let located = locate(bundle, self.config.allow_following_fallback)?;

        run.advance(IngestStage::Parsing);
        let mut raw = Vec::new();
        for entry in &located.entries {
            let ids = parse(&entry.bytes, located.format).map_err(|source| IngestError::Parse {
                entry: entry.name.clone(),
                source,
            })?;
            tracing::debug!(entry = %entry.name, identifiers = ids.len(), "Parsed entry");
            raw.extend(ids);
        }

        run.advance(IngestStage::Normalizing);
        let raw_count = raw.len();
        let current = normalize(raw);

        run.advance(IngestStage::Diffing);
        let diff = diff(previous, &current);

        Ok(IngestOutcome {
            current,
            diff,
            source: located.source,
            format: located.format,
            source_kind: located.source_kind,
            entries: located.entries.into_iter().map(|e| e.name).collect(),
            raw_count,
        })
    }
}

/// Logs stage transitions of one run.
#[derive(Debug)]
struct StageTracker {
    stage: IngestStage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            stage: IngestStage::Idle,
        }
    }
}

impl StageTracker {
    fn advance(&mut self, next: IngestStage) {
        tracing::debug!(from = %self.stage, to = %next, "Ingestion stage");
        self.stage = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content: &str) -> Bundle {
        Bundle::File(RawEntry::new(name, content.as_bytes().to_vec()))
    }

    fn snapshot(ids: &[&str]) -> Snapshot {
        normalize(ids.iter().copied())
    }

    #[test]
    fn test_end_to_end_loose_json() {
        let ingestor = Ingestor::default();
        let previous = snapshot(&["a", "b", "c"]);

        let outcome = ingestor
            .ingest(
                file("followers.json", r#"[{"username":"B"},{"username":"c"},{"username":"d"}]"#),
                &previous,
            )
            .unwrap();

        assert_eq!(outcome.current, snapshot(&["b", "c", "d"]));
        assert_eq!(outcome.diff.entered, snapshot(&["d"]).as_set().clone());
        assert_eq!(outcome.diff.left, snapshot(&["a"]).as_set().clone());
        assert_eq!(outcome.source_kind, SourceKind::JsonFile);
        assert_eq!(outcome.raw_count, 3);
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn test_multi_part_archive_concatenates_parts() {
        let ingestor = Ingestor::default();
        let bundle = Bundle::Archive(vec![
            RawEntry::new("followers_2.json", br#"[{"username":"y"}]"#.to_vec()),
            RawEntry::new("followers_1.json", br#"[{"username":"x"}]"#.to_vec()),
        ]);

        let outcome = ingestor.ingest(bundle, &Snapshot::empty()).unwrap();

        assert_eq!(outcome.current, snapshot(&["x", "y"]));
        assert_eq!(outcome.entries, vec!["followers_1.json", "followers_2.json"]);
    }

    #[test]
    fn test_degraded_fallback_is_flagged() {
        let ingestor = Ingestor::default();
        let bundle = Bundle::Archive(vec![RawEntry::new(
            "connections/following.json",
            br#"[{"username":"kim"}]"#.to_vec(),
        )]);

        let outcome = ingestor.ingest(bundle, &Snapshot::empty()).unwrap();

        assert!(outcome.is_degraded());
        assert_eq!(outcome.current, snapshot(&["kim"]));
    }

    #[test]
    fn test_strict_config_rejects_fallback() {
        let ingestor = Ingestor::new(IngestConfig::default().strict());
        let bundle = Bundle::Archive(vec![RawEntry::new("following.json", b"[]".to_vec())]);

        let err = ingestor.ingest(bundle, &Snapshot::empty()).unwrap_err();

        assert_eq!(err.kind(), FailureKind::NotFound);
        assert_eq!(err.stage(), IngestStage::Locating);
    }

    #[test]
    fn test_malformed_entry_names_the_entry() {
        let ingestor = Ingestor::default();
        let err = ingestor
            .ingest(file("followers.json", "{not json"), &Snapshot::empty())
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::MalformedInput);
        assert_eq!(err.stage(), IngestStage::Parsing);
        assert!(err.to_string().starts_with("followers.json:"));
    }

    #[test]
    fn test_unsupported_loose_file() {
        let ingestor = Ingestor::default();
        let err = ingestor
            .ingest_upload("followers.txt", b"bob".to_vec(), &Snapshot::empty())
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnsupportedFormat);
        assert!(!err.user_message().is_empty());
    }

    #[test]
    fn test_unrecognized_json_is_empty_extraction() {
        let ingestor = Ingestor::default();
        let previous = snapshot(&["a"]);
        let outcome = ingestor
            .ingest(file("followers.json", r#"{"profile":{}}"#), &previous)
            .unwrap();

        assert!(outcome.is_empty_extraction());
        assert_eq!(outcome.diff.left.len(), 1);
    }

    #[test]
    fn test_csv_upload() {
        let ingestor = Ingestor::default();
        let outcome = ingestor
            .ingest_upload(
                "followers.csv",
                b"username,timestamp\n\"alice\",2024-01-01\n".to_vec(),
                &Snapshot::empty(),
            )
            .unwrap();
        assert_eq!(outcome.current, snapshot(&["alice"]));
        assert_eq!(outcome.source_kind, SourceKind::CsvFile);
    }

    #[cfg(feature = "zip")]
    #[test]
    fn test_corrupt_zip_upload_is_malformed() {
        let ingestor = Ingestor::default();
        let err = ingestor
            .ingest_upload("export.ZIP", b"nope".to_vec(), &Snapshot::empty())
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedInput);
    }
}
