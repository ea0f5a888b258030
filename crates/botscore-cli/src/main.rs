//! botscore CLI - Command-line interface
//!
//! Usage:
//!   botscore run [--range 36000..47000]... [--workers N]
//!   botscore check <id>
//!   botscore inspect [--threshold 0.5]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use botscore_batch::{BatchDriver, PartitionStrategy};
use botscore_client::BotometerClient;
use botscore_core::{AccountId, AppConfig, IdRange, LoggingConfig, MergePolicy, ScoringClient};
use botscore_loader::SampleSource;
use botscore_store::{FailureReport, JsonFileStore, PersistenceMerger, StoreStats};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "botscore")]
#[command(about = "Batch bot-score enrichment for sampled accounts")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a sample and merge the results into the store
    Run(RunArgs),
    /// Score a single account and print the result
    Check {
        /// Account identifier
        id: String,
    },
    /// Summarize the stored scores
    Inspect {
        /// Store path
        #[arg(long)]
        output: Option<PathBuf>,

        /// Cap at or above which an account counts as a likely bot
        #[arg(long, default_value_t = 0.5)]
        threshold: f64,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Sample file (csv, tsv, xlsx, xls, ods, json, jsonl)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Identifier column of the sample
    #[arg(long)]
    column: Option<String>,

    /// Store path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Failure report path
    #[arg(long)]
    failures: Option<PathBuf>,

    /// Index range `start..end`, one worker each (repeatable)
    #[arg(long = "range")]
    ranges: Vec<IdRange>,

    /// Split the sample evenly across N workers instead of explicit ranges
    #[arg(long)]
    workers: Option<usize>,

    /// First index of the even split
    #[arg(long, requires = "workers")]
    from: Option<usize>,

    /// End index of the even split (sample size when omitted)
    #[arg(long, requires = "workers")]
    to: Option<usize>,

    /// keep_existing or prefer_fresh
    #[arg(long)]
    merge_policy: Option<MergePolicy>,

    /// Score ranges one after another instead of concurrently
    #[arg(long)]
    serial: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded configuration
    fn apply(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.input.path = input.clone();
        }
        if let Some(column) = &self.column {
            config.input.column = column.clone();
        }
        if let Some(output) = &self.output {
            config.store.path = output.clone();
        }
        if let Some(failures) = &self.failures {
            config.store.failures_path = failures.clone();
        }
        if !self.ranges.is_empty() {
            config.batch.ranges = self.ranges.clone();
            config.batch.workers = None;
        }
        if let Some(workers) = self.workers {
            config.batch.workers = Some(workers);
            config.batch.even_start = self.from.unwrap_or(0);
            config.batch.even_end = self.to;
        }
        if let Some(policy) = self.merge_policy {
            config.store.merge_policy = policy;
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    Ok(config.with_env_override()?)
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: AppConfig, serial: bool) -> anyhow::Result<()> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    if config.scorer.api_key.is_none() {
        tracing::warn!("No RapidAPI key configured (set RAPIDAPI_KEY); requests may be rejected");
    }

    let client =
        BotometerClient::from_config(&config.scorer).context("Failed to create scoring client")?;
    let driver = BatchDriver::new(Arc::new(client), SampleSource::from_config(&config.input))
        .with_progress_every(config.batch.progress_every);

    let strategy = PartitionStrategy::from_config(&config.batch);
    let ranges = driver
        .resolve(&strategy)
        .await
        .context("Failed to partition sample")?;

    tracing::info!(
        run_id = %run_id,
        input = %config.input.path.display(),
        ranges = ?ranges,
        "Starting run"
    );

    let outcome = if serial {
        driver.run_serial(&ranges).await
    } else {
        driver.run_ranges(&ranges).await
    }
    .context("Batch run failed")?;

    FailureReport::new(run_id, started_at, outcome.attempted(), outcome.failures.clone())
        .write(&config.store.failures_path)
        .await
        .context("Failed to write failure report")?;

    let merger = PersistenceMerger::for_path(&config.store.path, config.store.merge_policy);
    let summary = merger
        .persist(&outcome.scores)
        .await
        .context("Failed to persist scores")?;

    println!(
        "Scored {} of {} accounts ({} failed); store {} now holds {} ({} added, {} kept, {} replaced)",
        summary.fresh,
        outcome.attempted(),
        outcome.failures.len(),
        config.store.path.display(),
        summary.total,
        summary.added,
        summary.kept_prior,
        summary.replaced,
    );

    Ok(())
}

async fn check(config: AppConfig, id: String) -> anyhow::Result<()> {
    let client =
        BotometerClient::from_config(&config.scorer).context("Failed to create scoring client")?;
    let record = client
        .check(&AccountId::from(id.as_str()))
        .await
        .with_context(|| format!("Scoring failed for account {id}"))?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn inspect(config: AppConfig, output: Option<PathBuf>, threshold: f64) -> anyhow::Result<()> {
    let store = JsonFileStore::new(output.unwrap_or(config.store.path));
    let scores = store
        .load()
        .await
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    let stats = StoreStats::from_map(&scores, threshold);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    if let Commands::Run(args) = &cli.command {
        args.apply(&mut config);
    }
    config.validate()?;

    init_logging(&config.logging);

    match cli.command {
        Commands::Run(args) => {
            run(config, args.serial).await?;
            println!("{}", chrono::Local::now());
        }
        Commands::Check { id } => check(config, id).await?,
        Commands::Inspect { output, threshold } => inspect(config, output, threshold).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_ranges_override() {
        let cli = Cli::try_parse_from([
            "botscore",
            "run",
            "--range",
            "0..100",
            "--range",
            "100..250",
            "--output",
            "out/scores.json",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(
            config.batch.ranges,
            vec![IdRange::new(0, 100), IdRange::new(100, 250)]
        );
        assert_eq!(config.store.path, PathBuf::from("out/scores.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_even_split_override() {
        let cli = Cli::try_parse_from([
            "botscore",
            "run",
            "--workers",
            "4",
            "--from",
            "1000",
            "--merge-policy",
            "prefer_fresh",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.batch.workers, Some(4));
        assert_eq!(config.batch.even_start, 1000);
        assert_eq!(config.batch.even_end, None);
        assert_eq!(config.store.merge_policy, MergePolicy::PreferFresh);
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(Cli::try_parse_from(["botscore", "run", "--range", "abc"]).is_err());
        assert!(Cli::try_parse_from(["botscore", "run", "--from", "5"]).is_err());
    }

    #[test]
    fn test_default_run_keeps_reference_ranges() {
        let mut config = AppConfig::default();
        RunArgs::default().apply(&mut config);
        assert_eq!(config.batch.ranges.len(), 3);
        assert_eq!(config.batch.workers, None);
    }
}
