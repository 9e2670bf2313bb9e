//! Identifier normalization.
//!
//! ```text
//! normalize(raw) = set { lowercase(trim(r)) | r ∈ raw, trim(r) ≠ "" }
//! ```
//!
//! Normalization never fails: an empty input yields an empty snapshot.

use crate::types::{Identifier, Snapshot};

/// Canonicalize raw identifier strings into a snapshot.
///
/// Trims whitespace, lowercases, drops blanks and collapses duplicates.
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
///
/// # Example
///
/// ```rust
/// use follower_diff::normalize::normalize;
///
/// let snapshot = normalize([" User_X ", "user_x", "USER_X", "  "]);
/// assert_eq!(snapshot.len(), 1);
/// assert_eq!(snapshot.iter().next().unwrap().as_str(), "user_x");
/// ```
pub fn normalize<I, S>(raw: I) -> Snapshot
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|r| Identifier::parse(r.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace_variants_collapse() {
        let snapshot = normalize([" User_X ", "user_x", "USER_X"]);
        let ids: Vec<&str> = snapshot.iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["user_x"]);
    }

    #[test]
    fn test_blanks_dropped() {
        let snapshot = normalize(["", " ", "\t\n", "bob"]);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_empty_input_is_empty_snapshot() {
        let snapshot = normalize(Vec::<String>::new());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_idempotent() {
        let once = normalize(["B", " a", "c ", "A"]);
        let twice = normalize(once.iter().map(|i| i.as_str()));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unicode_case_fold() {
        let snapshot = normalize(["ÉLODIE", "élodie"]);
        assert_eq!(snapshot.len(), 1);
    }
}
