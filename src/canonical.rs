//! Canonical serialization for deterministic fingerprints.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: Struct fields serialize in declaration order
//! - Stable set order: snapshots and diffs are `BTreeSet`s, never `HashSet`s
//! - Same membership → same fingerprint, on every run and every machine

use serde::Serialize;
use sha2::{Digest, Sha256};
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes for hashing.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// SHA-256 of raw uploaded bytes, as lowercase hex.
///
/// Recorded on every import so two imports of the same file can be told apart
/// from two imports of different files with identical follower sets.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_determinism() {
        let set: BTreeSet<&str> = ["bob", "alice"].into_iter().collect();

        let h1 = canonical_hash(&set);
        let h2 = canonical_hash(&set);
        assert_eq!(h1, h2);
        assert_eq!(canonical_hash_hex(&set).len(), 16);
    }

    #[test]
    fn test_content_digest_is_sha256_hex() {
        let digest = content_digest(b"");
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
