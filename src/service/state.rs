//! Service state management.

use std::sync::Arc;

use crate::importer::Importer;
use crate::ingestor::Ingestor;
use crate::store::FollowerStore;

/// Default cap on one uploaded export (128 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 128 * 1024 * 1024;

/// Shared service state.
///
/// Contains the importer (and through it the follower store) plus the upload
/// size limit applied to import requests.
pub struct ServiceState<S: FollowerStore + 'static> {
    /// Runs imports against the store.
    pub importer: Importer<S>,
    max_upload_bytes: usize,
}

impl<S: FollowerStore + 'static> ServiceState<S> {
    /// Create new service state over a store.
    pub fn new(store: S, ingestor: Ingestor) -> Self {
        Self {
            importer: Importer::new(Arc::new(store), ingestor),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Create service state from environment variables.
    ///
    /// Reads `MAX_UPLOAD_BYTES` and the ingestion settings of
    /// [`IngestConfig::from_env`](crate::config::IngestConfig::from_env).
    pub fn from_env(store: S) -> Self {
        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        Self::new(store, Ingestor::from_env()).with_max_upload_bytes(max_upload_bytes)
    }

    /// Override the upload size limit.
    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Upload size limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// The follower store.
    pub fn store(&self) -> &Arc<S> {
        self.importer.store()
    }
}

impl<S: FollowerStore + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            importer: self.importer.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}
