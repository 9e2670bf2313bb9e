//! Snapshot diff engine.
//!
//! ```text
//! entered = current − previous
//! left    = previous − current
//! ```
//!
//! ## Guarantees
//!
//! - Pure: no hidden state, no I/O
//! - Deterministic: outputs are ordered sets, so replaying the same pair gives
//!   bit-identical results (and identical fingerprints)
//! - Linear: both differences are a single merge walk over two sorted sets
//! - `entered ∩ left = ∅` and `(previous ∪ entered) − left == current`

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::canonical::canonical_hash_hex;
use crate::types::{Identifier, Snapshot};

/// Entered/left partition between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Identifiers in the current snapshot but not the previous one.
    pub entered: BTreeSet<Identifier>,
    /// Identifiers in the previous snapshot but not the current one.
    pub left: BTreeSet<Identifier>,
}

impl DiffResult {
    /// Whether nothing entered or left.
    pub fn is_unchanged(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }

    /// Total number of events this diff produces.
    pub fn event_count(&self) -> usize {
        self.entered.len() + self.left.len()
    }

    /// Reconstruct the current snapshot from the previous one.
    ///
    /// `diff(a, b).apply(&a) == b` for all snapshots `a`, `b`.
    pub fn apply(&self, previous: &Snapshot) -> Snapshot {
        previous
            .iter()
            .chain(self.entered.iter())
            .filter(|id| !self.left.contains(*id))
            .cloned()
            .collect()
    }

    /// Deterministic xxh64 fingerprint of the partition (hex).
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(self)
    }
}

/// Compute the entered/left partition of `previous` → `current`.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> DiffResult {
    let prev = previous.as_set();
    let curr = current.as_set();

    DiffResult {
        entered: curr.difference(prev).cloned().collect(),
        left: prev.difference(curr).cloned().collect(),
    }
}
