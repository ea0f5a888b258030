//! Per-range scorer
//!
//! Scores every account of one slice in order. A failed call never aborts
//! the slice: it is logged, recorded in the outcome and skipped.

use botscore_core::{AccountId, IdRange, ScoreFailure, ScoreMap, ScoringClient};

/// Everything one worker produced for its range
#[derive(Debug, Clone)]
pub struct SliceOutcome {
    /// Range the slice was taken from
    pub range: IdRange,

    /// Accounts in the slice
    pub attempted: usize,

    /// Successfully scored accounts
    pub scores: ScoreMap,

    /// Accounts whose scoring call failed
    pub failures: Vec<ScoreFailure>,
}

impl SliceOutcome {
    pub fn new(range: IdRange) -> Self {
        Self {
            range,
            attempted: 0,
            scores: ScoreMap::new(),
            failures: Vec::new(),
        }
    }
}

/// Score `ids`, the accounts of `range`, one call at a time
///
/// Logs progress every `progress_every`-th local index that succeeds.
pub async fn score_slice(
    client: &dyn ScoringClient,
    ids: &[AccountId],
    range: IdRange,
    progress_every: usize,
) -> SliceOutcome {
    let mut outcome = SliceOutcome::new(range);
    let progress_every = progress_every.max(1);

    for (index, id) in ids.iter().enumerate() {
        outcome.attempted += 1;

        match client.check(id).await {
            Ok(record) => {
                outcome.scores.insert(id.clone(), record);
                if index % progress_every == 0 {
                    tracing::info!(range = %range, index, "Processed {range}:{index} accounts");
                }
            }
            Err(e) => {
                tracing::warn!(
                    account = %id,
                    range = %range,
                    index,
                    error = %e,
                    "Scoring failed for account {id}"
                );
                outcome.failures.push(ScoreFailure {
                    account_id: id.clone(),
                    range,
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        range = %range,
        scored = outcome.scores.len(),
        failed = outcome.failures.len(),
        "Finished {range}"
    );

    outcome
}
