//! Concurrent batch driver
//!
//! Runs one worker task per range. Workers share nothing but the scoring
//! client; each loads its own slice and returns its own mapping, which the
//! driver merges once every worker has finished.

use std::sync::Arc;

use botscore_core::{check_disjoint, IdRange, ScoreFailure, ScoreMap, ScoringClient};
use botscore_loader::SampleSource;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::partition::PartitionStrategy;
use crate::scorer::{score_slice, SliceOutcome};
use crate::BatchError;

/// Per-range counts of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSummary {
    pub range: IdRange,
    pub attempted: usize,
    pub scored: usize,
    pub failed: usize,
}

/// Merged result of every worker
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Scores from all ranges
    pub scores: ScoreMap,

    /// Failures from all ranges, in range order
    pub failures: Vec<ScoreFailure>,

    /// One entry per range, in range order
    pub slices: Vec<SliceSummary>,
}

impl RunOutcome {
    /// Total accounts attempted
    pub fn attempted(&self) -> usize {
        self.slices.iter().map(|s| s.attempted).sum()
    }
}

/// Merge slice outcomes in order; a later slice wins on a key collision
pub fn merge_outcomes(outcomes: impl IntoIterator<Item = SliceOutcome>) -> RunOutcome {
    let mut merged = RunOutcome::default();

    for outcome in outcomes {
        merged.slices.push(SliceSummary {
            range: outcome.range,
            attempted: outcome.attempted,
            scored: outcome.scores.len(),
            failed: outcome.failures.len(),
        });
        merged.scores.extend(outcome.scores);
        merged.failures.extend(outcome.failures);
    }

    merged
}

/// Drives the scoring of a sample across concurrent workers
pub struct BatchDriver {
    client: Arc<dyn ScoringClient>,
    source: SampleSource,
    progress_every: usize,
}

impl BatchDriver {
    pub fn new(client: Arc<dyn ScoringClient>, source: SampleSource) -> Self {
        Self {
            client,
            source,
            progress_every: 50,
        }
    }

    /// Log progress every N accounts within a range
    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1);
        self
    }

    /// Resolve the strategy against the sample and run every range
    pub async fn run(&self, strategy: &PartitionStrategy) -> Result<RunOutcome, BatchError> {
        let ranges = self.resolve(strategy).await?;
        self.run_ranges(&ranges).await
    }

    /// Resolve a strategy into concrete ranges, reading the sample size only
    /// when the strategy needs it
    pub async fn resolve(&self, strategy: &PartitionStrategy) -> Result<Vec<IdRange>, BatchError> {
        let total = if strategy.needs_total() {
            let ids = self
                .source
                .load_identifiers()
                .await
                .map_err(|e| BatchError::Load {
                    range: None,
                    source: e,
                })?;
            Some(ids.len())
        } else {
            None
        };

        strategy.ranges(total)
    }

    /// Score each range on its own task and merge the results
    ///
    /// A loader failure or a panicked worker aborts the run; the remaining
    /// workers are cancelled.
    pub async fn run_ranges(&self, ranges: &[IdRange]) -> Result<RunOutcome, BatchError> {
        check_disjoint(ranges)?;

        let mut workers = JoinSet::new();
        for (slot, range) in ranges.iter().copied().enumerate() {
            let client = Arc::clone(&self.client);
            let source = self.source.clone();
            let progress_every = self.progress_every;

            let span = tracing::info_span!("worker", range = %range);
            workers.spawn(
                async move {
                    let outcome = score_range(client.as_ref(), &source, range, progress_every).await?;
                    Ok::<_, BatchError>((slot, outcome))
                }
                .instrument(span),
            );
        }

        tracing::info!(workers = ranges.len(), "Started batch workers");

        let mut outcomes: Vec<Option<SliceOutcome>> = (0..ranges.len()).map(|_| None).collect();
        while let Some(joined) = workers.join_next().await {
            let (slot, outcome) = joined.map_err(|e| BatchError::Worker(e.to_string()))??;
            outcomes[slot] = Some(outcome);
        }

        Ok(merge_outcomes(outcomes.into_iter().flatten()))
    }

    /// Score the ranges one after another on the current task
    pub async fn run_serial(&self, ranges: &[IdRange]) -> Result<RunOutcome, BatchError> {
        check_disjoint(ranges)?;

        let mut outcomes = Vec::with_capacity(ranges.len());
        for range in ranges.iter().copied() {
            outcomes.push(
                score_range(self.client.as_ref(), &self.source, range, self.progress_every).await?,
            );
        }

        Ok(merge_outcomes(outcomes))
    }
}

async fn score_range(
    client: &dyn ScoringClient,
    source: &SampleSource,
    range: IdRange,
    progress_every: usize,
) -> Result<SliceOutcome, BatchError> {
    let ids = source
        .load_slice(range)
        .await
        .map_err(|e| BatchError::Load {
            range: Some(range),
            source: e,
        })?;

    tracing::debug!(range = %range, accounts = ids.len(), "Loaded slice");

    Ok(score_slice(client, &ids, range, progress_every).await)
}
