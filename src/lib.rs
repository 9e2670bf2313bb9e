//! # follower-diff
//!
//! Deterministic follower-list diffing over social platform export bundles.
//!
//! Answers one question per upload:
//!
//! > Compared with the last import, who started following and who stopped?
//!
//! ## Pipeline
//!
//! ```text
//! upload → Bundle → locate → parse → normalize → Snapshot ─┐
//!                                                          ├→ diff → DiffResult
//!                          FollowerStore (previous) ───────┘
//! ```
//!
//! The core ([`archive`], [`parser`], [`normalize`], [`diff`], [`ingestor`])
//! is pure and synchronous. Persistence sits behind the async
//! [`FollowerStore`] trait; [`Importer`] runs read-previous, ingest and commit
//! as one import.
//!
//! ## Determinism Guarantees
//!
//! - Same bundle + same previous snapshot → identical snapshot and diff
//! - Snapshots and diffs are ordered sets with stable xxh64 fingerprints
//! - A degraded result (identifiers from a "following" file) is always flagged

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod canonical;
pub mod config;
pub mod diff;
pub mod importer;
pub mod ingestor;
pub mod normalize;
pub mod parser;
pub mod store;
pub mod types;

#[cfg(feature = "zip")]
pub mod zip_bundle;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use archive::{locate, Bundle, ContentFormat, DataSource, LocateError, LocatedEntry, RawEntry};
pub use canonical::{canonical_hash, canonical_hash_hex, content_digest, to_canonical_bytes};
pub use config::IngestConfig;
pub use diff::{diff, DiffResult};
pub use importer::{ImportError, ImportReport, Importer};
pub use ingestor::{FailureKind, IngestError, IngestOutcome, IngestStage, Ingestor};
pub use normalize::normalize;
pub use parser::{parse, ParseError};
pub use store::{FollowerStore, InMemoryFollowerStore};
#[cfg(feature = "postgres")]
pub use store::PostgresFollowerStore;
pub use types::{
    AccountId, Event, EventKind, FollowerRecord, FollowerStatus, FollowerSummary, Identifier,
    ImportId, ImportMetadata, ImportRecord, Snapshot, SourceKind,
};
#[cfg(feature = "zip")]
pub use zip_bundle::{read_archive, ZipBundleError};
