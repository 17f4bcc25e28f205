//! Delta-set computation.

use std::collections::{BTreeMap, BTreeSet};

/// The created/updated/deleted id partition produced by comparing a
/// remote id → last-modified-time snapshot against the cache's snapshot
/// for the same query scope.
///
/// Last-modified times are opaque strings compared only for equality.
/// No attempt is made to guess *why* two values differ (server clock,
/// field change, no-op save): any difference counts as an update. An
/// unnecessary refetch is acceptable; a missed update is not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaSet {
    /// Ids present remotely but not in the cache.
    pub created: BTreeSet<String>,
    /// Ids present in both with differing last-modified times.
    pub updated: BTreeSet<String>,
    /// Ids present in the cache but not remotely.
    pub deleted: BTreeSet<String>,
}

impl DeltaSet {
    /// Computes the delta between a remote snapshot and the local one.
    ///
    /// O(n) in the number of distinct ids across both snapshots. The
    /// three sets are disjoint and partition the union of key sets.
    #[must_use]
    pub fn compute(
        remote: &BTreeMap<String, String>,
        local: &BTreeMap<String, String>,
    ) -> Self {
        let mut delta = Self::default();

        for (id, remote_lmt) in remote {
            match local.get(id) {
                None => {
                    delta.created.insert(id.clone());
                }
                Some(local_lmt) if local_lmt != remote_lmt => {
                    delta.updated.insert(id.clone());
                }
                Some(_) => {}
            }
        }

        for id in local.keys() {
            if !remote.contains_key(id) {
                delta.deleted.insert(id.clone());
            }
        }

        delta
    }

    /// Ids that need a full-object fetch: created plus updated.
    #[must_use]
    pub fn changed_ids(&self) -> Vec<String> {
        self.created.iter().chain(self.updated.iter()).cloned().collect()
    }

    /// Returns true when both snapshots already agree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(id, lmt)| (id.to_string(), lmt.to_string()))
            .collect()
    }

    #[test]
    fn partition_example() {
        // Local {A:1, B:2} against remote {B:3, C:1}.
        let local = snapshot(&[("A", "1"), ("B", "2")]);
        let remote = snapshot(&[("B", "3"), ("C", "1")]);

        let delta = DeltaSet::compute(&remote, &local);
        assert_eq!(delta.created, BTreeSet::from(["C".to_string()]));
        assert_eq!(delta.updated, BTreeSet::from(["B".to_string()]));
        assert_eq!(delta.deleted, BTreeSet::from(["A".to_string()]));
    }

    #[test]
    fn equal_snapshots_are_empty() {
        let snap = snapshot(&[("A", "1"), ("B", "2")]);
        let delta = DeltaSet::compute(&snap, &snap.clone());
        assert!(delta.is_empty());
    }

    #[test]
    fn string_inequality_counts_as_update() {
        // Semantically equal timestamps in different formats still differ
        // as strings, which deliberately triggers a refetch.
        let local = snapshot(&[("A", "2024-01-01T00:00:00Z")]);
        let remote = snapshot(&[("A", "2024-01-01T00:00:00.000Z")]);

        let delta = DeltaSet::compute(&remote, &local);
        assert_eq!(delta.updated.len(), 1);
    }

    #[test]
    fn changed_ids_covers_created_and_updated() {
        let local = snapshot(&[("A", "1")]);
        let remote = snapshot(&[("A", "2"), ("B", "1")]);

        let delta = DeltaSet::compute(&remote, &local);
        assert_eq!(delta.changed_ids(), vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn empty_local_creates_everything() {
        let local = BTreeMap::new();
        let remote = snapshot(&[("A", "1"), ("B", "2")]);

        let delta = DeltaSet::compute(&remote, &local);
        assert_eq!(delta.created.len(), 2);
        assert!(delta.updated.is_empty());
        assert!(delta.deleted.is_empty());
    }

    proptest! {
        /// created/updated/deleted are pairwise disjoint, and
        /// created ∪ updated ∪ deleted ∪ unchanged covers exactly the
        /// union of both key sets.
        #[test]
        fn partition_property(
            remote in proptest::collection::btree_map("[a-d]{1,2}", "[0-3]", 0..12),
            local in proptest::collection::btree_map("[a-d]{1,2}", "[0-3]", 0..12),
        ) {
            let delta = DeltaSet::compute(&remote, &local);

            prop_assert!(delta.created.is_disjoint(&delta.updated));
            prop_assert!(delta.created.is_disjoint(&delta.deleted));
            prop_assert!(delta.updated.is_disjoint(&delta.deleted));

            let union: BTreeSet<String> =
                remote.keys().chain(local.keys()).cloned().collect();
            for id in &delta.created {
                prop_assert!(remote.contains_key(id) && !local.contains_key(id));
            }
            for id in &delta.deleted {
                prop_assert!(local.contains_key(id) && !remote.contains_key(id));
            }
            for id in &delta.updated {
                prop_assert!(remote.contains_key(id) && local.contains_key(id));
                prop_assert_ne!(remote.get(id), local.get(id));
            }

            let mut covered: BTreeSet<String> = BTreeSet::new();
            covered.extend(delta.created.iter().cloned());
            covered.extend(delta.updated.iter().cloned());
            covered.extend(delta.deleted.iter().cloned());
            for id in &union {
                let unchanged = remote.get(id) == local.get(id);
                prop_assert_eq!(covered.contains(id), !unchanged);
            }
        }
    }
}
