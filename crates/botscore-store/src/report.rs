//! Per-run failure report
//!
//! Lists every account whose scoring call failed, so that failed accounts
//! are never silently dropped.

use std::path::Path;

use botscore_core::ScoreFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::json_store::write_json_atomic;
use crate::{Result, StoreError};

/// Failures of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    pub failures: Vec<ScoreFailure>,
}

impl FailureReport {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        attempted: usize,
        failures: Vec<ScoreFailure>,
    ) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            attempted,
            failures,
        }
    }

    /// Overwrite the report at `path`
    pub async fn write(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self).await?;
        tracing::info!(
            path = %path.display(),
            failures = self.failures.len(),
            "Wrote failure report"
        );
        Ok(())
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
            snapshot: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botscore_core::{AccountId, IdRange};

    #[tokio::test]
    async fn test_report_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failures.json");

        let report = FailureReport::new(
            Uuid::new_v4(),
            Utc::now(),
            5,
            vec![ScoreFailure {
                account_id: AccountId::from("U3"),
                range: IdRange::new(0, 5),
                index: 2,
                reason: "Unknown account: U3".to_string(),
            }],
        );
        report.write(&path).await.unwrap();

        let back = FailureReport::read(&path).await.unwrap();
        assert_eq!(back, report);
        assert!(back.finished_at >= back.started_at);
    }
}
