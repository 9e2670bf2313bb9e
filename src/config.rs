//! Ingestion configuration.
//!
//! All settings can be configured via environment variables:
//! - `FOLLOWER_DIFF_ALLOW_FOLLOWING_FALLBACK`: consult "following" files when no
//!   followers file exists (default: true)
//! - `FOLLOWER_DIFF_MAX_ARCHIVE_ENTRIES`: maximum `.json`/`.csv` entries in an
//!   uploaded archive; media are not counted (default: 10000)
//! - `FOLLOWER_DIFF_MAX_ENTRY_BYTES`: maximum decompressed size of one entry (default: 64 MiB)

use serde::{Deserialize, Serialize};

/// Default cap on archive entries.
pub const DEFAULT_MAX_ARCHIVE_ENTRIES: usize = 10_000;

/// Default cap on one decompressed entry.
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Whether the degraded "following" fallback may be used (default: true).
    pub allow_following_fallback: bool,
    /// Maximum number of `.json`/`.csv` entries accepted in an archive (default: 10000).
    pub max_archive_entries: usize,
    /// Maximum decompressed size of a located archive entry (default: 64 MiB).
    pub max_entry_bytes: u64,
}

impl IngestConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            allow_following_fallback: std::env::var("FOLLOWER_DIFF_ALLOW_FOLLOWING_FALLBACK")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(true),
            max_archive_entries: std::env::var("FOLLOWER_DIFF_MAX_ARCHIVE_ENTRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_ARCHIVE_ENTRIES),
            max_entry_bytes: std::env::var("FOLLOWER_DIFF_MAX_ENTRY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_ENTRY_BYTES),
        }
    }

    /// Disable the "following" fallback.
    pub fn strict(mut self) -> Self {
        self.allow_following_fallback = false;
        self
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allow_following_fallback: true,
            max_archive_entries: DEFAULT_MAX_ARCHIVE_ENTRIES,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
