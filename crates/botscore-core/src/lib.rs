//! botscore Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout botscore:
//! - Account identifiers and score records
//! - Index ranges over the deduplicated identifier sequence
//! - The `ScoringClient` trait implemented by the scoring service adapter
//! - Common error types
//! - Configuration management
//!
//! Author: hephaex@gmail.com

pub mod config;

pub use config::{
    AppConfig, BatchConfig, ConfigError, InputConfig, LoggingConfig, MergePolicy, ScorerConfig,
    StoreConfig,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Failure of a single scoring call
///
/// Every variant is recoverable at the batch level: the scorer records the
/// failure and moves on to the next account.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

// ============================================================================
// Accounts and Scores
// ============================================================================

/// Opaque identifier of one user account
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Language-specific sub-scores reported by the scoring service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayScores {
    /// Score from the English-language model
    pub english: f64,

    /// Score from the language-independent model
    pub universal: f64,
}

/// Result of scoring one account
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Complete automation probability
    pub cap: f64,

    /// Display sub-scores
    pub scores: DisplayScores,
}

impl ScoreRecord {
    pub fn new(cap: f64, english: f64, universal: f64) -> Self {
        Self {
            cap,
            scores: DisplayScores { english, universal },
        }
    }
}

/// Mapping from account to score, ordered by account so that the persisted
/// form is stable across runs
pub type ScoreMap = BTreeMap<AccountId, ScoreRecord>;

// ============================================================================
// Index Ranges
// ============================================================================

/// Half-open range `[start, end)` over the deduplicated identifier sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdRange {
    pub start: usize,
    pub end: usize,
}

impl IdRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of positions covered (zero for an inverted range)
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether two ranges share at least one position
    pub fn overlaps(&self, other: &IdRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for IdRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl std::str::FromStr for IdRange {
    type Err = ConfigError;

    /// Parse `start..end` (or `start-end`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidValue {
            key: "range".to_string(),
            value: s.to_string(),
        };

        let (start, end) = s
            .split_once("..")
            .or_else(|| s.split_once('-'))
            .ok_or_else(invalid)?;

        let start = start.trim().parse().map_err(|_| invalid())?;
        let end = end.trim().parse().map_err(|_| invalid())?;

        Ok(Self { start, end })
    }
}

/// Verify that every range is well-formed and that no two ranges overlap
pub fn check_disjoint(ranges: &[IdRange]) -> Result<(), ConfigError> {
    if let Some(bad) = ranges.iter().find(|r| r.start > r.end) {
        return Err(ConfigError::InvalidValue {
            key: "range".to_string(),
            value: bad.to_string(),
        });
    }

    let mut sorted: Vec<IdRange> = ranges.iter().copied().filter(|r| !r.is_empty()).collect();
    sorted.sort();

    // Compare against the range reaching furthest so far, not only the neighbour.
    let mut furthest: Option<IdRange> = None;
    for range in sorted {
        if let Some(prev) = furthest {
            if prev.overlaps(&range) {
                return Err(ConfigError::OverlappingRanges {
                    first: prev,
                    second: range,
                });
            }
        }
        if furthest.map_or(true, |prev| range.end > prev.end) {
            furthest = Some(range);
        }
    }

    Ok(())
}

// ============================================================================
// Failures
// ============================================================================

/// A scoring call that failed during a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFailure {
    /// Account whose scoring failed
    pub account_id: AccountId,

    /// Range of the batch that attempted it
    pub range: IdRange,

    /// Local index within the batch
    pub index: usize,

    /// Human-readable failure reason
    pub reason: String,
}

// ============================================================================
// Scoring Client Trait
// ============================================================================

/// Trait for the external bot-detection scoring service
///
/// Implementations own rate limiting: when configured to wait, `check`
/// blocks the calling task until the service accepts the request.
#[async_trait]
pub trait ScoringClient: Send + Sync {
    /// Score a single account
    async fn check(&self, account: &AccountId) -> Result<ScoreRecord, ScoringError>;
}

#[async_trait]
impl<T: ScoringClient + ?Sized> ScoringClient for Arc<T> {
    async fn check(&self, account: &AccountId) -> Result<ScoreRecord, ScoringError> {
        (**self).check(account).await
    }
}

#[async_trait]
impl<T: ScoringClient + ?Sized> ScoringClient for Box<T> {
    async fn check(&self, account: &AccountId) -> Result<ScoreRecord, ScoringError> {
        (**self).check(account).await
    }
}

// ============================================================================
// Tests
// ============================================================================
