//! Identifier and snapshot types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::canonical::canonical_hash_hex;

/// Canonical handle of one follower/following account.
///
/// Always trimmed, lowercased and non-empty. Two raw handles are the same
/// entity iff they produce the same `Identifier`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Canonicalize a raw handle. Returns `None` when nothing is left after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_lowercase()))
    }

    /// Get the canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the canonical string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The full set of identifiers observed by one import.
///
/// Backed by a `BTreeSet` so iteration, serialization and fingerprints are
/// deterministic. A snapshot is never mutated after it is built; every import
/// produces a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeSet<Identifier>);

impl Snapshot {
    /// The empty snapshot (no prior import).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from already-canonical identifiers.
    pub fn from_identifiers<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = Identifier>,
    {
        Self(ids.into_iter().collect())
    }

    /// Check membership.
    pub fn contains(&self, id: &Identifier) -> bool {
        self.0.contains(id)
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the snapshot has no identifiers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate identifiers in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.0.iter()
    }

    /// Borrow the underlying set.
    pub fn as_set(&self) -> &BTreeSet<Identifier> {
        &self.0
    }

    /// Deterministic xxh64 fingerprint of the membership (hex).
    ///
    /// Equal snapshots always share a fingerprint, which lets a store detect
    /// that the "previous" snapshot a diff was computed against is stale.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&self.0)
    }
}

impl FromIterator<Identifier> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        Self::from_identifiers(iter)
    }
}

impl IntoIterator for Snapshot {
    type Item = Identifier;
    type IntoIter = std::collections::btree_set::IntoIter<Identifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Identifier;
    type IntoIter = std::collections::btree_set::Iter<'a, Identifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_lowercases() {
        let id = Identifier::parse("  Jane_Doe \t").unwrap();
        assert_eq!(id.as_str(), "jane_doe");
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!(Identifier::parse("").is_none());
        assert!(Identifier::parse("   \n").is_none());
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let a: Snapshot = ["b", "a", "c"].iter().filter_map(|s| Identifier::parse(s)).collect();
        let b: Snapshot = ["c", "b", "a"].iter().filter_map(|s| Identifier::parse(s)).collect();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_membership() {
        let a: Snapshot = ["a"].iter().filter_map(|s| Identifier::parse(s)).collect();
        assert_ne!(a.fingerprint(), Snapshot::empty().fingerprint());
    }

    #[test]
    fn test_serializes_as_sorted_list() {
        let s: Snapshot = ["zed", "amy"].iter().filter_map(|s| Identifier::parse(s)).collect();
        assert_eq!(serde_json::to_string(&s).unwrap(), r#"["amy","zed"]"#);
    }
}
