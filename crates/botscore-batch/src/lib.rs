//! botscore Batch - Concurrent scoring of a sample
//!
//! The pipeline for one run:
//! 1. Resolve the partition strategy into disjoint index ranges
//! 2. Start one worker per range; each loads its slice and scores it
//! 3. Join every worker and merge their mappings in range order
//!
//! Persisting the merged mapping is left to `botscore-store`.
//!
//! Author: hephaex@gmail.com

use botscore_core::{ConfigError, IdRange};
use botscore_loader::LoaderError;
use thiserror::Error;

pub mod driver;
pub mod partition;
pub mod scorer;

pub use driver::{merge_outcomes, BatchDriver, RunOutcome, SliceSummary};
pub use partition::{even_split, PartitionStrategy};
pub use scorer::{score_slice, SliceOutcome};

/// Errors that abort a batch run
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to load sample{}", range_suffix(.range))]
    Load {
        range: Option<IdRange>,
        #[source]
        source: LoaderError,
    },

    #[error("Invalid partition: {0}")]
    Partition(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, BatchError>;

fn range_suffix(range: &Option<IdRange>) -> String {
    match range {
        Some(range) => format!(" for range {range}"),
        None => String::new(),
    }
}
