//! botscore Configuration Management
//!
//! Handles configuration from environment variables, config files,
//! and command-line arguments with defaults matching the reference run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{check_disjoint, IdRange};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Sample input configuration
    pub input: InputConfig,

    /// Scoring service configuration
    pub scorer: ScorerConfig,

    /// Batch partitioning configuration
    pub batch: BatchConfig,

    /// Result store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        // Input
        if let Ok(path) = std::env::var("BOTSCORE_INPUT") {
            self.input.path = path.into();
        }
        if let Ok(column) = std::env::var("BOTSCORE_COLUMN") {
            self.input.column = column;
        }

        // Scorer
        if let Ok(url) = std::env::var("BOTOMETER_API_URL") {
            self.scorer.api_url = url;
        }
        // Always use env for sensitive values
        if let Ok(key) = std::env::var("RAPIDAPI_KEY") {
            self.scorer.api_key = Some(key);
        }

        // Batch
        if let Ok(workers) = std::env::var("BOTSCORE_WORKERS") {
            let parsed = workers.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BOTSCORE_WORKERS".to_string(),
                value: workers,
            })?;
            self.batch.workers = Some(parsed);
        }

        // Store
        if let Ok(path) = std::env::var("BOTSCORE_OUTPUT") {
            self.store.path = path.into();
        }
        if let Ok(path) = std::env::var("BOTSCORE_FAILURES") {
            self.store.failures_path = path.into();
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(self)
    }

    /// Check invariants that cannot be expressed in the types
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.column.trim().is_empty() {
            return Err(ConfigError::MissingRequired("input.column".to_string()));
        }
        if self.batch.progress_every == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.progress_every".to_string(),
                value: "0".to_string(),
            });
        }
        match self.batch.workers {
            Some(0) => Err(ConfigError::InvalidValue {
                key: "batch.workers".to_string(),
                value: "0".to_string(),
            }),
            Some(_) => match self.batch.even_end {
                Some(end) if end < self.batch.even_start => Err(ConfigError::InvalidValue {
                    key: "batch.even_end".to_string(),
                    value: end.to_string(),
                }),
                _ => Ok(()),
            },
            None if self.batch.ranges.is_empty() => {
                Err(ConfigError::MissingRequired("batch.ranges".to_string()))
            }
            None => check_disjoint(&self.batch.ranges),
        }
    }
}

/// Sample input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Path to the tabular sample
    pub path: PathBuf,

    /// Column holding account identifiers
    pub column: String,

    /// Worksheet to read for spreadsheet inputs (first sheet when unset)
    pub sheet: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("Tweets/sampled.csv"),
            column: "UserId".to_string(),
            sheet: None,
        }
    }
}

/// Scoring service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Base URL of the scoring API
    pub api_url: String,

    /// RapidAPI key
    pub api_key: Option<String>,

    /// Block and retry when throttled instead of failing
    pub wait_on_rate_limit: bool,

    /// Wait used when a 429 response carries no reset hint
    pub rate_limit_wait_secs: u64,

    /// Give up after this many consecutive rate-limit waits (unbounded when unset)
    pub max_rate_limit_waits: Option<u32>,

    /// Minimum spacing between requests across all workers (0 disables)
    pub min_request_interval_ms: u64,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://botometer-pro.p.rapidapi.com".to_string(),
            api_key: None,
            wait_on_rate_limit: true,
            rate_limit_wait_secs: 60,
            max_rate_limit_waits: None,
            min_request_interval_ms: 0,
            timeout_secs: 30,
        }
    }
}

/// Batch partitioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Explicit ranges, one worker each (used when `workers` is unset)
    pub ranges: Vec<IdRange>,

    /// Split `even_start..even_end` evenly across this many workers
    pub workers: Option<usize>,

    /// First index of the even split
    pub even_start: usize,

    /// End of the even split (identifier count when unset)
    pub even_end: Option<usize>,

    /// Log progress every N accounts within a batch
    pub progress_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            ranges: vec![
                IdRange::new(36000, 47000),
                IdRange::new(47000, 58000),
                IdRange::new(58000, 69000),
            ],
            workers: None,
            even_start: 0,
            even_end: None,
            progress_every: 50,
        }
    }
}

/// Result store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the persisted score map
    pub path: PathBuf,

    /// Path of the per-run failure report
    pub failures_path: PathBuf,

    /// Which side wins when a fresh score collides with a stored one
    pub merge_policy: MergePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("Users/botscores.json"),
            failures_path: PathBuf::from("Users/botscore_failures.json"),
            merge_policy: MergePolicy::KeepExisting,
        }
    }
}

/// Collision rule for merging fresh scores into the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Stored scores are never replaced; reruns only add accounts
    #[default]
    KeepExisting,
    /// Fresh scores replace stored ones
    PreferFresh,
}

impl std::str::FromStr for MergePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "keep_existing" => Ok(Self::KeepExisting),
            "prefer_fresh" => Ok(Self::PreferFresh),
            _ => Err(ConfigError::InvalidValue {
                key: "store.merge_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Ranges {first} and {second} overlap")]
    OverlappingRanges { first: IdRange, second: IdRange },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.input.column, "UserId");
        assert_eq!(config.batch.ranges.len(), 3);
        assert_eq!(config.batch.ranges[0], IdRange::new(36000, 47000));
        assert_eq!(config.batch.progress_every, 50);
        assert!(config.scorer.wait_on_rate_limit);
        assert_eq!(config.store.merge_policy, MergePolicy::KeepExisting);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [input]
            path = "data/sample.xlsx"

            [batch]
            ranges = [{ start = 0, end = 100 }, { start = 100, end = 200 }]
            "#,
        )
        .unwrap();

        assert_eq!(config.input.path, PathBuf::from("data/sample.xlsx"));
        assert_eq!(config.input.column, "UserId");
        assert_eq!(config.batch.ranges[1], IdRange::new(100, 200));
        assert_eq!(config.store.path, PathBuf::from("Users/botscores.json"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/botscore.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut config = AppConfig::default();
        config.batch.ranges = vec![IdRange::new(0, 10), IdRange::new(5, 15)];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OverlappingRanges { .. })
        ));

        // An even split does not consult the explicit ranges
        config.batch.workers = Some(4);
        assert!(config.validate().is_ok());

        config.batch.workers = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_even_span() {
        let mut config = AppConfig::default();
        config.batch.workers = Some(3);
        config.batch.even_start = 100;
        config.batch.even_end = Some(50);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "batch.even_end"
        ));

        config.batch.even_end = Some(100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_policy_parse() {
        assert_eq!(
            "keep_existing".parse::<MergePolicy>().unwrap(),
            MergePolicy::KeepExisting
        );
        assert_eq!(
            "prefer-fresh".parse::<MergePolicy>().unwrap(),
            MergePolicy::PreferFresh
        );
        assert!("newest".parse::<MergePolicy>().is_err());
    }
}
