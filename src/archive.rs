//! Archive ingester: find the follower list inside an export bundle.
//!
//! Export layouts changed several times over the years, so entries are tested
//! against an ordered list of pattern groups:
//!
//! | Group | Matches | Degraded |
//! |-------|---------|----------|
//! | `TopLevel` | `followers*.json\|csv` with no directory | no |
//! | `KnownSubPath` | the same under `connections/followers_and_following/`, `followers_and_following/` or `connections/` | no |
//! | `AnyDepth` | the same in any other directory | no |
//! | `FollowingExact` | `following.json`, `following_<n>.json` | yes |
//! | `FollowingAny` | any `*following*.json` | yes |
//!
//! The first entry of the highest-priority non-empty group wins. The two
//! `Following*` groups answer "who I follow" instead of "who follows me", so
//! they are reported as [`DataSource::FollowingFallback`], never silently.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::types::SourceKind;

/// Format of a located entry, detected from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFormat {
    /// JSON document.
    Json,
    /// Comma-delimited text with a header line.
    Csv,
}

impl ContentFormat {
    /// Detect the format from a file name's extension (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".json") {
            Some(Self::Json)
        } else if lower.ends_with(".csv") {
            Some(Self::Csv)
        } else {
            None
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// One candidate file inside the supplied bundle.
#[derive(Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Entry path as stored in the container.
    pub name: String,
    /// Entry contents.
    pub bytes: Vec<u8>,
}

impl RawEntry {
    /// Create a new entry.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for RawEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawEntry")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// What the user supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bundle {
    /// Entries of a compressed container, in container order.
    Archive(Vec<RawEntry>),
    /// A single loose file.
    File(RawEntry),
}

/// Which question the located data answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// A true follower list.
    Followers,
    /// A "following" list used because no follower list exists.
    FollowingFallback,
}

impl DataSource {
    /// Whether results from this source must be flagged to the user.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::FollowingFallback)
    }
}

/// Pattern groups in priority order (lowest discriminant wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternGroup {
    /// Followers file at the top level.
    TopLevel,
    /// Followers file under a known export sub-path.
    KnownSubPath,
    /// Followers file in any other directory.
    AnyDepth,
    /// `following.json` / `following_<n>.json`.
    FollowingExact,
    /// Any JSON file whose name contains "following".
    FollowingAny,
}

impl PatternGroup {
    /// Data source implied by this group.
    pub fn source(&self) -> DataSource {
        match self {
            Self::TopLevel | Self::KnownSubPath | Self::AnyDepth => DataSource::Followers,
            Self::FollowingExact | Self::FollowingAny => DataSource::FollowingFallback,
        }
    }
}

/// Directories newer export layouts nest the follower list under.
const KNOWN_SUB_PATHS: &[&str] = &[
    "connections/followers_and_following",
    "followers_and_following",
    "connections",
];

/// Error type for locating follower data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    /// No entry in any pattern group matched.
    #[error("No follower list found in the export ({entries} entries inspected)")]
    NotFound {
        /// Number of entries inspected.
        entries: usize,
    },
    /// Loose file with an unrecognized extension.
    #[error("Unsupported file format: {file_name} (expected .json, .csv or .zip)")]
    UnsupportedFormat {
        /// The rejected file name.
        file_name: String,
    },
}

/// The entry (or entries, for multi-part exports) holding follower data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedEntry {
    /// Matched entries, never empty. A numbered multi-part export lists
    /// every part of the winning series in part order.
    pub entries: Vec<RawEntry>,
    /// Detected content format, shared by all entries.
    pub format: ContentFormat,
    /// Which question the data answers.
    pub source: DataSource,
    /// Winning pattern group (`None` for a loose file).
    pub group: Option<PatternGroup>,
    /// How the bytes were supplied.
    pub source_kind: SourceKind,
}

impl LocatedEntry {
    /// The first matched entry (lowest part of a multi-part export).
    pub fn primary(&self) -> &RawEntry {
        &self.entries[0]
    }

    /// Names of all matched entries.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

/// Locate the follower data in a bundle.
///
/// `allow_fallback` controls whether the degraded `Following*` groups are
/// consulted at all.
pub fn locate(bundle: Bundle, allow_fallback: bool) -> Result<LocatedEntry, LocateError> {
    match bundle {
        Bundle::File(entry) => {
            let format = ContentFormat::from_name(&entry.name).ok_or_else(|| {
                LocateError::UnsupportedFormat {
                    file_name: entry.name.clone(),
                }
            })?;
            let source_kind = match format {
                ContentFormat::Json => SourceKind::JsonFile,
                ContentFormat::Csv => SourceKind::CsvFile,
            };
            Ok(LocatedEntry {
                entries: vec![entry],
                format,
                source: DataSource::Followers,
                group: None,
                source_kind,
            })
        }
        Bundle::Archive(entries) => locate_in_archive(entries, allow_fallback),
    }
}

fn locate_in_archive(
    entries: Vec<RawEntry>,
    allow_fallback: bool,
) -> Result<LocatedEntry, LocateError> {
    let total = entries.len();

    let Some(selection) = select(entries.iter().map(|e| e.name.as_str()), allow_fallback) else {
        return Err(LocateError::NotFound { entries: total });
    };

    let format = ContentFormat::from_name(&selection.primary.base)
        .ok_or(LocateError::NotFound { entries: total })?;

    let mut slots: Vec<Option<RawEntry>> = entries.into_iter().map(Some).collect();
    let located: Vec<RawEntry> = selection
        .indices
        .iter()
        .filter_map(|idx| slots.get_mut(*idx).and_then(Option::take))
        .collect();

    tracing::debug!(
        group = ?selection.group,
        primary = %selection.primary.full,
        parts = located.len(),
        "Located follower data"
    );

    Ok(LocatedEntry {
        entries: located,
        format,
        source: selection.group.source(),
        group: Some(selection.group),
        source_kind: SourceKind::Archive,
    })
}

/// Entries picked by name alone.
#[derive(Debug, Clone)]
struct Selection {
    group: PatternGroup,
    primary: EntryPath,
    /// Container indices, in part order.
    indices: Vec<usize>,
}

fn select<'a>(
    names: impl IntoIterator<Item = &'a str>,
    allow_fallback: bool,
) -> Option<Selection> {
    let classified: Vec<(usize, PatternGroup, EntryPath)> = names
        .into_iter()
        .enumerate()
        .filter_map(|(idx, name)| {
            let path = EntryPath::new(name)?;
            let group = classify(&path)?;
            if !allow_fallback && group.source().is_degraded() {
                return None;
            }
            Some((idx, group, path))
        })
        .collect();

    // Ties inside a group go to container order.
    let (primary_idx, group, primary) = classified
        .iter()
        .min_by_key(|(idx, group, _)| (*group, *idx))
        .cloned()?;

    let mut picked: Vec<(u64, usize)> = vec![(0, primary_idx)];
    if let Some(part) = primary.part() {
        picked = classified
            .iter()
            .filter(|(_, g, _)| *g == group)
            .filter_map(|(idx, _, path)| {
                let other = path.part()?;
                (path.dir == primary.dir && other.same_series(&part))
                    .then_some((other.number, *idx))
            })
            .collect();
        picked.sort();
    }

    Some(Selection {
        group,
        primary,
        indices: picked.into_iter().map(|(_, idx)| idx).collect(),
    })
}

/// Container indices of the entries [`locate`] would pick, judged by name only.
///
/// Lets a container reader decompress just the follower data. Indices come
/// back in part order; empty when nothing matches.
pub(crate) fn select_entries<'a>(
    names: impl IntoIterator<Item = &'a str>,
    allow_fallback: bool,
) -> Vec<usize> {
    select(names, allow_fallback)
        .map(|selection| selection.indices)
        .unwrap_or_default()
}

/// Normalized view of an entry path.
#[derive(Debug, Clone)]
struct EntryPath {
    full: String,
    dir: String,
    base: String,
}

impl EntryPath {
    /// Normalize separators and split; `None` for entries that never hold data.
    fn new(name: &str) -> Option<Self> {
        let replaced = name.replace('\\', "/");
        let mut rest = replaced.as_str();
        while let Some(stripped) = rest.strip_prefix("./").or_else(|| rest.strip_prefix('/')) {
            rest = stripped;
        }
        let full = rest.to_string();
        if full.is_empty() || full.ends_with('/') {
            return None;
        }

        let (dir, base) = match full.rsplit_once('/') {
            Some((dir, base)) => (dir.to_string(), base.to_string()),
            None => (String::new(), full.clone()),
        };

        let lower_dir = dir.to_ascii_lowercase();
        if lower_dir == "__macosx" || lower_dir.starts_with("__macosx/") || base.starts_with("._") {
            return None;
        }

        Some(Self { full, dir, base })
    }

    fn in_known_sub_path(&self) -> bool {
        let dir = self.dir.to_ascii_lowercase();
        KNOWN_SUB_PATHS.iter().any(|known| {
            dir == *known
                || dir
                    .strip_suffix(known)
                    .is_some_and(|prefix| prefix.ends_with('/'))
        })
    }

    fn part(&self) -> Option<PartName> {
        let caps = part_pattern().captures(&self.base)?;
        Some(PartName {
            stem: caps.get(1)?.as_str().to_ascii_lowercase(),
            number: caps.get(2)?.as_str().parse().ok()?,
            ext: caps.get(3)?.as_str().to_ascii_lowercase(),
        })
    }
}

/// `<stem>_<n>.<ext>` file name of a multi-part export.
#[derive(Debug, Clone)]
struct PartName {
    stem: String,
    number: u64,
    ext: String,
}

impl PartName {
    fn same_series(&self, other: &PartName) -> bool {
        self.stem == other.stem && self.ext == other.ext
    }
}

fn classify(path: &EntryPath) -> Option<PatternGroup> {
    if followers_pattern().is_match(&path.base) {
        return Some(if path.dir.is_empty() {
            PatternGroup::TopLevel
        } else if path.in_known_sub_path() {
            PatternGroup::KnownSubPath
        } else {
            PatternGroup::AnyDepth
        });
    }

    if ContentFormat::from_name(&path.base) != Some(ContentFormat::Json) {
        return None;
    }
    if following_exact_pattern().is_match(&path.base) {
        Some(PatternGroup::FollowingExact)
    } else if path.base.to_ascii_lowercase().contains("following") {
        Some(PatternGroup::FollowingAny)
    } else {
        None
    }
}

fn followers_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^followers[^/]*\.(json|csv)$").expect("valid followers pattern"))
}

fn following_exact_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^following(_\d+)?\.json$").expect("valid following pattern"))
}

fn part_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(.+)_(\d+)\.(json|csv)$").expect("valid part pattern"))
}
