//! ZIP container decoding into a [`Bundle`].
//!
//! Entries are chosen by name before anything is decompressed: only the
//! follower file (or every part of a multi-part series) is read. Everything
//! else in the export is never inflated or size-checked.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::archive::{select_entries, Bundle, ContentFormat, RawEntry};
use crate::config::IngestConfig;

/// Error type for ZIP decoding.
#[derive(Debug, thiserror::Error)]
pub enum ZipBundleError {
    /// The container itself cannot be read.
    #[error("Corrupt archive: {0}")]
    Corrupt(#[from] zip::result::ZipError),
    /// More `.json`/`.csv` entries than the configured limit.
    #[error("Archive has {entries} data entries, limit is {limit}")]
    TooManyEntries {
        /// `.json`/`.csv` entries in the archive.
        entries: usize,
        /// Configured limit.
        limit: usize,
    },
    /// One entry decompresses past the configured limit.
    #[error("Archive entry {name} exceeds {limit} bytes")]
    EntryTooLarge {
        /// Entry path.
        name: String,
        /// Configured limit.
        limit: u64,
    },
    /// Decompression failed mid-entry.
    #[error("Failed to read archive entry {name}: {source}")]
    Io {
        /// Entry path.
        name: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Decode the follower entries of a ZIP container into an archive bundle.
///
/// The bundle holds only the entries [`locate`](crate::archive::locate)
/// would pick, in container order; it is empty when no name matches.
pub fn read_archive(bytes: &[u8], config: &IngestConfig) -> Result<Bundle, ZipBundleError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut names = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let file = archive.by_index_raw(idx)?;
        names.push(if file.is_dir() {
            String::new()
        } else {
            file.name().to_string()
        });
    }

    let data_entries = names
        .iter()
        .filter(|name| ContentFormat::from_name(name).is_some())
        .count();
    if data_entries > config.max_archive_entries {
        return Err(ZipBundleError::TooManyEntries {
            entries: data_entries,
            limit: config.max_archive_entries,
        });
    }

    let mut selected = select_entries(
        names.iter().map(String::as_str),
        config.allow_following_fallback,
    );
    selected.sort_unstable();

    let mut entries = Vec::with_capacity(selected.len());
    for idx in selected {
        let file = archive.by_index(idx)?;
        let name = file.name().to_string();
        let declared = file.size();
        let bytes = read_capped(file, &name, declared, config.max_entry_bytes)?;
        entries.push(RawEntry::new(name, bytes));
    }

    tracing::debug!(
        total = names.len(),
        data_entries = data_entries,
        selected = entries.len(),
        "Decoded export archive"
    );

    Ok(Bundle::Archive(entries))
}

fn read_capped(
    file: impl Read,
    name: &str,
    declared: u64,
    limit: u64,
) -> Result<Vec<u8>, ZipBundleError> {
    let too_large = || ZipBundleError::EntryTooLarge {
        name: name.to_string(),
        limit,
    };
    if declared > limit {
        return Err(too_large());
    }

    // Declared sizes can lie; cap the actual read as well.
    let hint = usize::try_from(declared.min(limit)).unwrap_or(0);
    let mut buf = Vec::with_capacity(hint);
    file.take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|source| ZipBundleError::Io {
            name: name.to_string(),
            source,
        })?;
    if buf.len() as u64 > limit {
        return Err(too_large());
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn entry_names(bundle: &Bundle) -> Vec<&str> {
        let Bundle::Archive(entries) = bundle else {
            panic!("expected archive bundle");
        };
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_reads_only_follower_entries() {
        let bytes = build_zip(&[
            ("media/photo.jpg", "PNG"),
            ("followers_1.json", "[]"),
            ("connections/following.json", "{}"),
        ]);

        let bundle = read_archive(&bytes, &IngestConfig::default()).unwrap();
        assert_eq!(entry_names(&bundle), vec!["followers_1.json"]);
        assert!(matches!(bundle, Bundle::Archive(ref e) if e[0].bytes == b"[]".to_vec()));
    }

    #[test]
    fn test_parts_kept_in_container_order() {
        let bytes = build_zip(&[
            ("followers_2.json", "[]"),
            ("notes.json", "{}"),
            ("followers_1.json", "[]"),
        ]);
        let bundle = read_archive(&bytes, &IngestConfig::default()).unwrap();
        assert_eq!(entry_names(&bundle), vec!["followers_2.json", "followers_1.json"]);
    }

    #[test]
    fn test_following_read_when_no_followers_file() {
        let bytes = build_zip(&[("connections/following.json", "{}")]);

        let bundle = read_archive(&bytes, &IngestConfig::default()).unwrap();
        assert_eq!(entry_names(&bundle), vec!["connections/following.json"]);

        let strict = read_archive(&bytes, &IngestConfig::default().strict()).unwrap();
        assert!(entry_names(&strict).is_empty());
    }

    #[test]
    fn test_large_unrelated_entry_not_size_checked() {
        let message = "x".repeat(4096);
        let bytes = build_zip(&[
            ("followers_1.json", r#"[{"username":"a"}]"#),
            ("messages/inbox/bob/message_1.json", message.as_str()),
        ]);
        let config = IngestConfig {
            max_entry_bytes: 1024,
            ..IngestConfig::default()
        };

        let bundle = read_archive(&bytes, &config).unwrap();
        assert_eq!(entry_names(&bundle), vec!["followers_1.json"]);
    }

    #[test]
    fn test_media_not_counted_against_entry_limit() {
        let bytes = build_zip(&[
            ("media/1.jpg", "jpeg"),
            ("media/2.jpg", "jpeg"),
            ("media/3.jpg", "jpeg"),
            ("media/4.mp4", "mp4"),
            ("media/5.jpg", "jpeg"),
            ("followers_1.json", "[]"),
        ]);
        let config = IngestConfig {
            max_archive_entries: 3,
            ..IngestConfig::default()
        };

        let bundle = read_archive(&bytes, &config).unwrap();
        assert_eq!(entry_names(&bundle), vec!["followers_1.json"]);
    }

    #[test]
    fn test_unbounded_entry_limit() {
        let bytes = build_zip(&[("followers.json", "[]")]);
        let config = IngestConfig {
            max_entry_bytes: u64::MAX,
            ..IngestConfig::default()
        };

        let bundle = read_archive(&bytes, &config).unwrap();
        assert_eq!(entry_names(&bundle), vec!["followers.json"]);
    }

    #[test]
    fn test_corrupt_archive() {
        let err = read_archive(b"definitely not a zip", &IngestConfig::default()).unwrap_err();
        assert!(matches!(err, ZipBundleError::Corrupt(_)));
    }

    #[test]
    fn test_entry_limit() {
        let bytes = build_zip(&[("a.json", "[]"), ("b.json", "[]")]);
        let config = IngestConfig {
            max_archive_entries: 1,
            ..IngestConfig::default()
        };
        let err = read_archive(&bytes, &config).unwrap_err();
        assert!(matches!(err, ZipBundleError::TooManyEntries { entries: 2, limit: 1 }));
    }

    #[test]
    fn test_entry_size_limit() {
        let padding = " ".repeat(64);
        let bytes = build_zip(&[("followers.json", padding.as_str())]);
        let config = IngestConfig {
            max_entry_bytes: 16,
            ..IngestConfig::default()
        };
        let err = read_archive(&bytes, &config).unwrap_err();
        assert!(matches!(err, ZipBundleError::EntryTooLarge { limit: 16, .. }));
    }
}
