//! botscore Client - Botometer scoring API adapter
//!
//! Implements `ScoringClient` over the RapidAPI-hosted Botometer service.
//! Rate limiting lives here: with `wait_on_rate_limit` set, a throttled
//! request sleeps for the advertised reset time and is retried, so callers
//! only ever see a block, never a rate-limit failure.
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use botscore_core::{AccountId, ScoreRecord, ScorerConfig, ScoringClient, ScoringError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

pub mod throttle;

pub use throttle::RequestThrottle;

const USER_AGENT: &str = concat!("botscore/", env!("CARGO_PKG_VERSION"));
const RATELIMIT_RESET_HEADER: &str = "x-ratelimit-requests-reset";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct CheckAccountRequest<'a> {
    user: UserRef<'a>,
}

#[derive(Debug, Serialize)]
struct UserRef<'a> {
    id_str: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckAccountResponse {
    cap: f64,
    display_scores: DisplayScoresResponse,
}

#[derive(Debug, Deserialize)]
struct DisplayScoresResponse {
    english: f64,
    universal: f64,
}

/// Decode a check-account response body into a score record
pub fn parse_check_response(body: &str) -> Result<ScoreRecord, ScoringError> {
    let response: CheckAccountResponse = serde_json::from_str(body)
        .map_err(|e| ScoringError::Malformed(format!("Failed to parse response: {e}")))?;

    Ok(ScoreRecord::new(
        response.cap,
        response.display_scores.english,
        response.display_scores.universal,
    ))
}

/// Reset hint of a throttled response, from `Retry-After` or the RapidAPI
/// reset header (both in seconds)
pub fn rate_limit_reset(headers: &HeaderMap) -> Option<Duration> {
    [RETRY_AFTER.as_str(), RATELIMIT_RESET_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

// ============================================================================
// Botometer Client
// ============================================================================

/// Botometer API client
pub struct BotometerClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_host: String,
    wait_on_rate_limit: bool,
    default_wait: Duration,
    max_waits: Option<u32>,
    throttle: Option<Arc<RequestThrottle>>,
}

impl BotometerClient {
    /// Create a new client for `base_url`
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ScoringError> {
        Self::build(base_url.into(), api_key, Duration::from_secs(30))
    }

    /// Create from config
    pub fn from_config(config: &ScorerConfig) -> Result<Self, ScoringError> {
        let mut client = Self::build(
            config.api_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;

        client.wait_on_rate_limit = config.wait_on_rate_limit;
        client.default_wait = Duration::from_secs(config.rate_limit_wait_secs);
        client.max_waits = config.max_rate_limit_waits;
        if config.min_request_interval_ms > 0 {
            client = client.with_min_interval(Duration::from_millis(config.min_request_interval_ms));
        }

        Ok(client)
    }

    fn build(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ScoringError> {
        let url = reqwest::Url::parse(&base_url)
            .map_err(|e| ScoringError::Network(format!("Invalid API URL {base_url}: {e}")))?;
        let api_host = url.host_str().unwrap_or_default().to_string();

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ScoringError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_host,
            wait_on_rate_limit: true,
            default_wait: Duration::from_secs(60),
            max_waits: None,
            throttle: None,
        })
    }

    /// Block and retry on 429 instead of failing
    pub fn with_wait_on_rate_limit(mut self, enabled: bool) -> Self {
        self.wait_on_rate_limit = enabled;
        self
    }

    /// Space requests at least `interval` apart
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.throttle = Some(Arc::new(RequestThrottle::new(interval)));
        self
    }

    /// Endpoint of the check-account operation
    pub fn endpoint(&self) -> String {
        format!("{}/4/check_account", self.base_url)
    }

    async fn send_once(
        &self,
        account: &AccountId,
    ) -> Result<reqwest::Response, ScoringError> {
        if let Some(throttle) = &self.throttle {
            throttle.wait().await;
        }

        let mut request = self
            .client
            .post(self.endpoint())
            .header("x-rapidapi-host", &self.api_host)
            .json(&CheckAccountRequest {
                user: UserRef {
                    id_str: account.as_str(),
                },
            });

        if let Some(key) = &self.api_key {
            request = request.header("x-rapidapi-key", key);
        }

        request
            .send()
            .await
            .map_err(|e| ScoringError::Network(format!("Request failed: {e}")))
    }
}

#[async_trait]
impl ScoringClient for BotometerClient {
    async fn check(&self, account: &AccountId) -> Result<ScoreRecord, ScoringError> {
        let mut waits = 0u32;

        loop {
            let response = self.send_once(account).await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let reset = rate_limit_reset(response.headers());

                if !self.wait_on_rate_limit || self.max_waits.is_some_and(|max| waits >= max) {
                    return Err(ScoringError::RateLimited {
                        retry_after_secs: reset.map(|d| d.as_secs()),
                    });
                }

                let wait = reset.unwrap_or(self.default_wait);
                waits += 1;
                tracing::warn!(
                    account = %account,
                    wait_secs = wait.as_secs(),
                    attempt = waits,
                    "Rate limit reached, waiting"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(|e| ScoringError::Network(format!("Failed to read response: {e}")))?;

            return match status {
                s if s.is_success() => parse_check_response(&body),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Err(ScoringError::Unauthorized(body))
                }
                StatusCode::NOT_FOUND => Err(ScoringError::UnknownAccount(account.to_string())),
                s => Err(ScoringError::Api {
                    status: s.as_u16(),
                    message: body,
                }),
            };
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
