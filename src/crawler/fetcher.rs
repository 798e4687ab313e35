//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings and timeouts
//! - Retrying transient failures with exponential backoff and jitter
//! - Honouring Retry-After on 429 responses
//! - Classifying failures into `FetchError` instead of propagating them

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::backoff::RetryPolicy;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Typed failure of a single fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpError(u16),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("gave up after {attempts} attempts, last error: {last}")]
    TooManyRetries { attempts: u32, last: Box<FetchError> },

    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

impl FetchError {
    /// Transient failures are worth another attempt
    ///
    /// | Condition | Transient |
    /// |-----------|-----------|
    /// | Timeout | yes |
    /// | Connection refused / reset | yes |
    /// | HTTP 5xx | yes |
    /// | HTTP 429 | yes |
    /// | Other HTTP 4xx | no |
    /// | Malformed target | no |
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionError(_) => true,
            Self::HttpError(status) => *status >= 500 || *status == 429,
            Self::TooManyRetries { .. } | Self::InvalidTarget(_) => false,
        }
    }
}

/// Result of fetching one target
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The target identifier that was fetched
    pub target: String,

    /// Response body, or why there is none
    pub outcome: Result<String, FetchError>,

    /// Status of the last response received, if any
    pub status: Option<u16>,

    /// Wall time across all attempts, including backoff sleeps
    pub elapsed: Duration,

    /// Attempts made after the first one
    pub retries: u32,

    /// Retry-After of the last 429 when retrying stopped on it
    pub retry_after: Option<Duration>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn body(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.outcome.as_ref().err()
    }
}

/// A failed attempt, before the retry decision
struct AttemptFailure {
    error: FetchError,
    status: Option<u16>,
    retry_after: Option<Duration>,
}

impl AttemptFailure {
    fn new(error: FetchError) -> Self {
        Self {
            error,
            status: None,
            retry_after: None,
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```
/// use aoty_harvest::config::UserAgentConfig;
/// use aoty_harvest::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(10));
/// assert!(client.is_ok());
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    request_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(request_timeout)
        .connect_timeout(request_timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches targets with retry and timeout policy
///
/// Concurrency is not enforced here: the caller holds a scheduler slot for
/// the duration of `fetch`. The scheduler spaces dispatches to a host; retries
/// inside one dispatch are spaced here by at least the politeness delay.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    politeness: Duration,
}

impl Fetcher {
    pub fn new(crawler: &CrawlerConfig, user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, crawler.request_timeout())?;
        Ok(Self::with_client(client, RetryPolicy::from_config(crawler))
            .with_politeness(crawler.politeness_delay()))
    }

    pub fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            politeness: Duration::ZERO,
        }
    }

    /// Minimum spacing between attempts on the same target
    pub fn with_politeness(mut self, politeness: Duration) -> Self {
        self.politeness = politeness;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches a target, retrying transient failures
    ///
    /// Never returns an error past this boundary: failures are carried in
    /// `FetchResult::outcome`. Once retries are exhausted the last error is
    /// wrapped in `FetchError::TooManyRetries`; with `max_retries = 0` the
    /// first error is returned as-is.
    pub async fn fetch(&self, target: &str) -> FetchResult {
        let started = Instant::now();

        let url = match parse_target(target) {
            Ok(url) => url,
            Err(error) => {
                return FetchResult {
                    target: target.to_string(),
                    outcome: Err(error),
                    status: None,
                    elapsed: started.elapsed(),
                    retries: 0,
                    retry_after: None,
                }
            }
        };

        let mut retries = 0;
        let mut last_status = None;
        let mut retry_after = None;

        let outcome = loop {
            match self.attempt(&url).await {
                Ok((status, body)) => {
                    last_status = Some(status);
                    break Ok(body);
                }
                Err(failure) => {
                    last_status = failure.status.or(last_status);

                    if !failure.error.is_transient() {
                        break Err(failure.error);
                    }

                    if retries >= self.policy.max_retries {
                        retry_after = failure.retry_after;
                        if retries == 0 {
                            break Err(failure.error);
                        }
                        break Err(FetchError::TooManyRetries {
                            attempts: retries + 1,
                            last: Box::new(failure.error),
                        });
                    }

                    let Some(backoff) = self.policy.delay_with_hint(retries + 1, failure.retry_after)
                    else {
                        tracing::info!(
                            "{} asked to wait {:?}, longer than the {:?} backoff limit",
                            target,
                            failure.retry_after.unwrap_or_default(),
                            self.policy.max_delay
                        );
                        retry_after = failure.retry_after;
                        break Err(failure.error);
                    };

                    retries += 1;
                    let delay = backoff.max(self.politeness);
                    tracing::debug!(
                        "Retry {}/{} for {} in {:?} after: {}",
                        retries,
                        self.policy.max_retries,
                        target,
                        delay,
                        failure.error
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        FetchResult {
            target: target.to_string(),
            outcome,
            status: last_status,
            elapsed: started.elapsed(),
            retries,
            retry_after,
        }
    }

    /// Makes a single GET request
    async fn attempt(&self, url: &Url) -> Result<(u16, String), AttemptFailure> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AttemptFailure::new(classify_error(&e)))?;

        let status = response.status();

        if !status.is_success() {
            let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
                parse_retry_after(response.headers(), Utc::now())
            } else {
                None
            };
            return Err(AttemptFailure {
                error: FetchError::HttpError(status.as_u16()),
                status: Some(status.as_u16()),
                retry_after,
            });
        }

        match response.text().await {
            Ok(body) => Ok((status.as_u16(), body)),
            Err(e) => Err(AttemptFailure {
                error: classify_error(&e),
                status: Some(status.as_u16()),
                retry_after: None,
            }),
        }
    }
}

/// Accepts only absolute http(s) URLs as fetch targets
fn parse_target(target: &str) -> Result<Url, FetchError> {
    let url = Url::parse(target).map_err(|e| FetchError::InvalidTarget(format!("{}: {}", target, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidTarget(format!(
            "{}: unsupported scheme '{}'",
            target, other
        ))),
    }
}

/// Maps a reqwest error onto the fetch taxonomy
fn classify_error(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_builder() {
        FetchError::InvalidTarget(error.to_string())
    } else {
        // Connect failures, resets and truncated bodies are all retried alike
        FetchError::ConnectionError(error.to_string())
    }
}

/// Reads a Retry-After header in either delta-seconds or HTTP-date form
fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
