//! botscore Store - Persisted account scores
//!
//! Provides:
//! - `JsonFileStore`: the score map as one JSON file, written atomically
//! - `PersistenceMerger`: merges a run's scores into the store, stored
//!   scores winning on collision unless configured otherwise
//! - `FailureReport`: accounts that could not be scored in a run
//! - `StoreStats`: summary of the stored scores

use std::path::{Path, PathBuf};

use botscore_core::ScoreMap;
use serde::Serialize;
use thiserror::Error;

pub mod json_store;
pub mod merge;
pub mod report;

pub use json_store::{write_atomic, write_json_atomic, JsonFileStore};
pub use merge::{merge_scores, MergeSummary, PersistenceMerger};
pub use report::FailureReport;

// ============================================================================
// Error Types
// ============================================================================

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store {path} is corrupt: {message}{}", snapshot_hint(.snapshot))]
    Corrupt {
        path: PathBuf,
        message: String,
        snapshot: Option<PathBuf>,
    },

    #[error("Serialization error: {0}")]
    Serialize(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn snapshot_hint(snapshot: &Option<PathBuf>) -> String {
    match snapshot {
        Some(path) => format!(" (this run's scores were saved to {})", path.display()),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Statistics
// ============================================================================

/// Summary of a score map
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoreStats {
    /// Scored accounts
    pub total: usize,

    /// Mean complete automation probability
    pub mean_cap: f64,

    /// Accounts with `cap >= threshold`
    pub likely_bots: usize,

    /// Threshold used for `likely_bots`
    pub threshold: f64,
}

impl StoreStats {
    pub fn from_map(scores: &ScoreMap, threshold: f64) -> Self {
        let total = scores.len();
        let mean_cap = if total == 0 {
            0.0
        } else {
            scores.values().map(|r| r.cap).sum::<f64>() / total as f64
        };
        let likely_bots = scores.values().filter(|r| r.cap >= threshold).count();

        Self {
            total,
            mean_cap,
            likely_bots,
            threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botscore_core::{AccountId, ScoreRecord};

    #[test]
    fn test_stats_empty() {
        let stats = StoreStats::from_map(&ScoreMap::new(), 0.5);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.mean_cap, 0.0);
        assert_eq!(stats.likely_bots, 0);
    }

    #[test]
    fn test_stats() {
        let mut scores = ScoreMap::new();
        scores.insert(AccountId::from("a"), ScoreRecord::new(0.25, 0.0, 0.0));
        scores.insert(AccountId::from("b"), ScoreRecord::new(0.75, 0.0, 0.0));
        scores.insert(AccountId::from("c"), ScoreRecord::new(0.5, 0.0, 0.0));

        let stats = StoreStats::from_map(&scores, 0.5);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.mean_cap, 0.5);
        assert_eq!(stats.likely_bots, 2);
    }

    #[test]
    fn test_corrupt_error_mentions_snapshot() {
        let err = StoreError::Corrupt {
            path: PathBuf::from("Users/botscores.json"),
            message: "EOF".to_string(),
            snapshot: Some(PathBuf::from("Users/botscores.json.fresh.json")),
        };
        assert!(err.to_string().contains("botscores.json.fresh.json"));
    }
}
