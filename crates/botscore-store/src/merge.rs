//! Merging fresh scores into the persisted store

use std::path::PathBuf;

use botscore_core::{MergePolicy, ScoreMap};
use serde::{Deserialize, Serialize};

use crate::json_store::JsonFileStore;
use crate::{Result, StoreError};

/// What a merge did to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    /// Accounts scored in this run
    pub fresh: usize,

    /// Fresh accounts that were not stored before
    pub added: usize,

    /// Fresh accounts already stored, whose stored score was kept
    pub kept_prior: usize,

    /// Fresh accounts already stored, whose stored score was replaced
    pub replaced: usize,

    /// Accounts in the store after the merge
    pub total: usize,
}

/// Merge `fresh` into `prior` under `policy`
pub fn merge_scores(
    mut prior: ScoreMap,
    fresh: ScoreMap,
    policy: MergePolicy,
) -> (ScoreMap, MergeSummary) {
    let mut summary = MergeSummary {
        fresh: fresh.len(),
        ..Default::default()
    };

    for (account, record) in fresh {
        match prior.entry(account) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(record);
                summary.added += 1;
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => match policy {
                MergePolicy::KeepExisting => summary.kept_prior += 1,
                MergePolicy::PreferFresh => {
                    slot.insert(record);
                    summary.replaced += 1;
                }
            },
        }
    }

    summary.total = prior.len();
    (prior, summary)
}

/// Merges a run's scores into the store on disk
///
/// The fresh scores are first written to a snapshot beside the store, so
/// that a corrupt store cannot lose them. A snapshot left behind by an
/// earlier aborted run is folded into the new one, and carried into the
/// store once a merge succeeds. The snapshot is removed after the merged
/// store has been written.
pub struct PersistenceMerger {
    store: JsonFileStore,
    snapshot: JsonFileStore,
    policy: MergePolicy,
}

impl PersistenceMerger {
    pub fn new(store: JsonFileStore, policy: MergePolicy) -> Self {
        let snapshot = store.snapshot();
        Self {
            store,
            snapshot,
            policy,
        }
    }

    pub fn for_path(path: impl Into<PathBuf>, policy: MergePolicy) -> Self {
        Self::new(JsonFileStore::new(path), policy)
    }

    pub fn store(&self) -> &JsonFileStore {
        &self.store
    }

    pub fn snapshot(&self) -> &JsonFileStore {
        &self.snapshot
    }

    /// Merge `fresh` with the stored scores and write the result back
    pub async fn persist(&self, fresh: &ScoreMap) -> Result<MergeSummary> {
        let pending = self.pending_with(fresh).await;
        self.snapshot.save(&pending).await?;

        let prior = self.store.load().await.map_err(|e| match e {
            StoreError::Corrupt { path, message, .. } => StoreError::Corrupt {
                path,
                message,
                snapshot: Some(self.snapshot.path().to_path_buf()),
            },
            other => other,
        })?;

        let (merged, summary) = merge_scores(prior, pending, self.policy);
        self.store.save(&merged).await?;
        self.snapshot.remove().await?;

        tracing::info!(
            path = %self.store.path().display(),
            fresh = summary.fresh,
            added = summary.added,
            kept_prior = summary.kept_prior,
            replaced = summary.replaced,
            total = summary.total,
            "Stored scores"
        );

        Ok(summary)
    }

    /// `fresh` plus any scores kept in a snapshot from an aborted run, the
    /// current run winning on collision
    async fn pending_with(&self, fresh: &ScoreMap) -> ScoreMap {
        match self.snapshot.load().await {
            Ok(carried) if carried.is_empty() => fresh.clone(),
            Ok(carried) => {
                tracing::warn!(
                    path = %self.snapshot.path().display(),
                    carried = carried.len(),
                    "Recovering scores from an earlier aborted run"
                );
                merge_scores(carried, fresh.clone(), MergePolicy::PreferFresh).0
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable snapshot, replacing it");
                fresh.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botscore_core::{AccountId, ScoreRecord};

    fn map(entries: &[(&str, f64)]) -> ScoreMap {
        entries
            .iter()
            .map(|(id, cap)| (AccountId::from(*id), ScoreRecord::new(*cap, 1.0, 2.0)))
            .collect()
    }

    #[test]
    fn test_prior_wins_on_collision() {
        let (merged, summary) = merge_scores(
            map(&[("U1", 0.2)]),
            map(&[("U1", 0.9), ("U6", 0.1)]),
            MergePolicy::KeepExisting,
        );

        assert_eq!(merged, map(&[("U1", 0.2), ("U6", 0.1)]));
        assert_eq!(
            summary,
            MergeSummary {
                fresh: 2,
                added: 1,
                kept_prior: 1,
                replaced: 0,
                total: 2,
            }
        );
    }

    #[test]
    fn test_prefer_fresh_policy() {
        let (merged, summary) = merge_scores(
            map(&[("U1", 0.2)]),
            map(&[("U1", 0.9)]),
            MergePolicy::PreferFresh,
        );
        assert_eq!(merged, map(&[("U1", 0.9)]));
        assert_eq!(summary.replaced, 1);
    }

    #[tokio::test]
    async fn test_persist_against_prior_store() {
        let dir = tempfile::tempdir().unwrap();
        let merger =
            PersistenceMerger::for_path(dir.path().join("botscores.json"), MergePolicy::default());
        merger.store().save(&map(&[("U1", 0.2)])).await.unwrap();

        let summary = merger
            .persist(&map(&[("U1", 0.9), ("U6", 0.1)]))
            .await
            .unwrap();

        assert_eq!(summary.added, 1);
        assert_eq!(
            merger.store().load().await.unwrap(),
            map(&[("U1", 0.2), ("U6", 0.1)])
        );
        assert!(!merger.snapshot().exists().await);
    }

    #[tokio::test]
    async fn test_persist_without_prior_store() {
        let dir = tempfile::tempdir().unwrap();
        let merger =
            PersistenceMerger::for_path(dir.path().join("botscores.json"), MergePolicy::default());

        let fresh = map(&[("U2", 0.4), ("U3", 0.5)]);
        let summary = merger.persist(&fresh).await.unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(merger.store().load().await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn test_persist_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let merger =
            PersistenceMerger::for_path(dir.path().join("botscores.json"), MergePolicy::default());
        merger
            .store()
            .save(&map(&[("U1", 0.2), ("U2", 0.3)]))
            .await
            .unwrap();

        let fresh = map(&[("U2", 0.8), ("U4", 0.6)]);
        merger.persist(&fresh).await.unwrap();
        let first = merger.store().load().await.unwrap();

        let summary = merger.persist(&fresh).await.unwrap();
        let second = merger.store().load().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second[&AccountId::from("U1")].cap, 0.2);
        assert_eq!(second[&AccountId::from("U2")].cap, 0.3);
        assert_eq!(summary.added, 0);
        assert_eq!(summary.kept_prior, 2);
    }

    #[tokio::test]
    async fn test_corrupt_store_keeps_fresh_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("botscores.json");
        std::fs::write(&path, b"\x80not json").unwrap();

        let merger = PersistenceMerger::for_path(&path, MergePolicy::default());
        let fresh = map(&[("U7", 0.7)]);

        let err = merger.persist(&fresh).await.unwrap_err();
        match err {
            StoreError::Corrupt { snapshot, .. } => {
                assert_eq!(snapshot.as_deref(), Some(merger.snapshot().path()));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(merger.snapshot().load().await.unwrap(), fresh);
        // The corrupt store is left untouched
        assert_eq!(std::fs::read(&path).unwrap(), b"\x80not json");
    }

    #[tokio::test]
    async fn test_aborted_runs_accumulate_in_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("botscores.json");
        std::fs::write(&path, b"{ truncated").unwrap();
        let merger = PersistenceMerger::for_path(&path, MergePolicy::default());

        assert!(merger.persist(&map(&[("U1", 0.1)])).await.is_err());
        assert!(merger.persist(&map(&[("U9", 0.9)])).await.is_err());
        assert_eq!(
            merger.snapshot().load().await.unwrap(),
            map(&[("U1", 0.1), ("U9", 0.9)])
        );

        // Once the store is repaired, both aborted runs reach it
        std::fs::remove_file(&path).unwrap();
        let summary = merger.persist(&map(&[("U4", 0.4)])).await.unwrap();

        assert_eq!(summary.added, 3);
        assert_eq!(
            merger.store().load().await.unwrap(),
            map(&[("U1", 0.1), ("U4", 0.4), ("U9", 0.9)])
        );
        assert!(!merger.snapshot().exists().await);
    }
}
