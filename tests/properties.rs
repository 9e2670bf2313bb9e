//! Property tests for normalization and diffing.

use follower_diff::{diff, normalize, Identifier, Snapshot};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────────────────

/// Handles drawn from a small alphabet so that snapshots overlap often.
fn raw_handle() -> impl Strategy<Value = String> {
    "[ \t]{0,2}[a-cA-C_.0-9]{1,4}[ \t]{0,2}"
}

fn snapshot() -> impl Strategy<Value = Snapshot> {
    prop::collection::vec(raw_handle(), 0..40).prop_map(|raw| normalize(raw))
}

// ─────────────────────────────────────────────────────────────────────────────
// Diff Laws
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_diff_with_self_is_empty(a in snapshot()) {
        let result = diff(&a, &a);
        prop_assert!(result.is_unchanged());
    }

    #[test]
    fn prop_entered_and_left_are_disjoint(a in snapshot(), b in snapshot()) {
        let result = diff(&a, &b);
        prop_assert!(result.entered.is_disjoint(&result.left));
    }

    #[test]
    fn prop_reconstruction(a in snapshot(), b in snapshot()) {
        let result = diff(&a, &b);
        prop_assert_eq!(result.apply(&a), b);
    }

    #[test]
    fn prop_entered_and_left_membership(a in snapshot(), b in snapshot()) {
        let result = diff(&a, &b);
        for id in &result.entered {
            prop_assert!(b.contains(id) && !a.contains(id));
        }
        for id in &result.left {
            prop_assert!(a.contains(id) && !b.contains(id));
        }
    }

    #[test]
    fn prop_diff_is_repeatable(a in snapshot(), b in snapshot()) {
        let first = diff(&a, &b);
        let second = diff(&a, &b);
        prop_assert_eq!(first.fingerprint(), second.fingerprint());
        prop_assert_eq!(first, second);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Normalization
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_normalize_is_idempotent(raw in prop::collection::vec(raw_handle(), 0..40)) {
        let once = normalize(&raw);
        let twice = normalize(once.iter().map(Identifier::as_str));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_case_and_padding_collapse(handle in "[a-z_.0-9]{1,12}") {
        let variants = [
            handle.clone(),
            handle.to_uppercase(),
            format!("  {}\t", handle),
        ];
        let snap = normalize(&variants);
        prop_assert_eq!(snap.len(), 1);
        prop_assert_eq!(snap.iter().next().map(Identifier::as_str), Some(handle.as_str()));
    }

    #[test]
    fn prop_input_order_does_not_matter(mut raw in prop::collection::vec(raw_handle(), 0..40)) {
        let forward = normalize(&raw);
        raw.reverse();
        prop_assert_eq!(forward.fingerprint(), normalize(&raw).fingerprint());
    }
}
