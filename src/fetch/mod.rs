//! Rate-limited, retrying page fetching with anti-bot countermeasures.
//!
//! All retries are local to one URL: the fetcher reports a permanently
//! failed fetch to its caller, which decides whether to skip the URL,
//! requeue it, or abandon the category. A failed fetch is never fatal to
//! a run.

pub mod rate_limiter;
pub mod response;
pub mod user_agent;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use response::{looks_like_html, FetchedPage};
pub use user_agent::resolve_user_agent;

/// Why a fetch permanently failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("blocked with HTTP {status} fetching {url}")]
    Blocked { url: String, status: u16 },
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("implausible content from {url}: {reason}")]
    InvalidContent { url: String, reason: String },
    #[error("fetch cancelled")]
    Cancelled,
}

/// Fetcher tuning, embedded in the application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Attempts per URL before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Timeout per attempt, request through body.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// First retry delay; doubles per attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Hard minimum delay after a 429.
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
    /// Smallest body accepted as a plausible HTML document.
    #[serde(default = "default_min_html_bytes")]
    pub min_html_bytes: usize,
    /// Minimum inter-request interval per domain.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// None = default agent, "impersonate" = browser pool, other = verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

fn default_max_attempts() -> u32 {
    4
}
fn default_attempt_timeout_secs() -> u64 {
    30
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    60_000
}
fn default_rate_limit_backoff_ms() -> u64 {
    5_000
}
fn default_min_html_bytes() -> usize {
    512
}
fn default_request_delay_ms() -> u64 {
    1_500
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            min_html_bytes: default_min_html_bytes(),
            request_delay_ms: default_request_delay_ms(),
            user_agent: None,
        }
    }
}

impl FetchSettings {
    /// Rate limiter config with this fetcher's base interval.
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            base_delay: Duration::from_millis(self.request_delay_ms),
            ..RateLimitConfig::default()
        }
    }
}

/// What kind of failure drives the next backoff sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackoffSignal {
    /// Plain failure: exponential schedule only.
    Normal,
    /// 429: exponential schedule with the hard rate-limit floor.
    RateLimited,
    /// 403/503: bot detection suspected, schedule escalated further.
    BotSuspected,
}

/// Deterministic lower bound for the sleep before the next attempt.
/// Jitter is added on top by the caller, never subtracted.
fn backoff_lower_bound(
    settings: &FetchSettings,
    attempt: u32,
    signal: BackoffSignal,
    retry_after: Option<Duration>,
) -> Duration {
    let exp = settings
        .backoff_base_ms
        .saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
    let floor_ms = match signal {
        BackoffSignal::Normal => exp,
        BackoffSignal::RateLimited => exp.max(settings.rate_limit_backoff_ms),
        BackoffSignal::BotSuspected => (exp.saturating_mul(2)).max(settings.rate_limit_backoff_ms),
    };
    let mut delay = Duration::from_millis(floor_ms.min(settings.backoff_max_ms));
    if let Some(ra) = retry_after {
        delay = delay.max(ra);
    }
    delay
}

/// Abstraction over page fetching so the crawl loop can be driven by
/// stub sources in tests.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Rate-limited, retrying HTTP page fetcher.
pub struct PageFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    settings: FetchSettings,
    cancel: CancellationToken,
}

impl PageFetcher {
    pub fn new(settings: FetchSettings, limiter: RateLimiter, cancel: CancellationToken) -> Self {
        let user_agent = resolve_user_agent(settings.user_agent.as_deref());
        let client = reqwest::Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(settings.attempt_timeout_secs))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            limiter,
            settings,
            cancel,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fetch one URL, retrying transient failures with backoff.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0u32;
        let mut last_error = FetchError::Network {
            url: url.to_string(),
            message: "no attempt made".to_string(),
        };

        while attempt < self.settings.max_attempts {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let domain = tokio::select! {
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                domain = self.limiter.acquire(url) => domain,
            };

            let (signal, retry_after) = match self.attempt(url, domain.as_deref(), attempt).await {
                Ok(page) => return Ok(page),
                Err(AttemptOutcome::Fatal(e)) => return Err(e),
                Err(AttemptOutcome::Retry {
                    error,
                    signal,
                    retry_after,
                }) => {
                    last_error = error;
                    (signal, retry_after)
                }
            };

            if attempt >= self.settings.max_attempts {
                break;
            }

            let floor = backoff_lower_bound(&self.settings, attempt, signal, retry_after);
            let jitter = Duration::from_millis(fastrand::u64(0..=(floor.as_millis() as u64 / 4)));
            debug!(
                "Retrying {} (attempt {}/{}) after {:?}",
                url,
                attempt + 1,
                self.settings.max_attempts,
                floor + jitter
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(floor + jitter) => {}
            }
        }

        warn!("Giving up on {} after {} attempts", url, attempt);
        Err(last_error)
    }

    async fn attempt(
        &self,
        url: &str,
        domain: Option<&str>,
        attempt: u32,
    ) -> Result<FetchedPage, AttemptOutcome> {
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(AttemptOutcome::Fatal(FetchError::Cancelled)),
            result = self.client.get(url).send() => result,
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let error = if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    FetchError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                };
                return Err(AttemptOutcome::Retry {
                    error,
                    signal: BackoffSignal::Normal,
                    retry_after: None,
                });
            }
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        match status {
            200..=299 => {
                let final_url = response.url().to_string();
                let body = tokio::select! {
                    _ = self.cancel.cancelled() => return Err(AttemptOutcome::Fatal(FetchError::Cancelled)),
                    body = response.text() => body,
                };
                let html = body.map_err(|e| AttemptOutcome::Retry {
                    error: FetchError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    },
                    signal: BackoffSignal::Normal,
                    retry_after: None,
                })?;

                if !looks_like_html(&html, self.settings.min_html_bytes) {
                    debug!("Implausible content from {} ({} bytes)", url, html.len());
                    return Err(AttemptOutcome::Retry {
                        error: FetchError::InvalidContent {
                            url: url.to_string(),
                            reason: format!("{} bytes, not HTML-shaped", html.len()),
                        },
                        signal: BackoffSignal::Normal,
                        retry_after: None,
                    });
                }

                if let Some(domain) = domain {
                    self.limiter.report_success(domain).await;
                }
                Ok(FetchedPage {
                    url: url.to_string(),
                    final_url,
                    status,
                    html,
                    retries: attempt - 1,
                    fetched_at: Utc::now(),
                })
            }
            429 => {
                if let Some(domain) = domain {
                    self.limiter.report_rate_limit(domain, status).await;
                }
                Err(AttemptOutcome::Retry {
                    error: FetchError::Blocked {
                        url: url.to_string(),
                        status,
                    },
                    signal: BackoffSignal::RateLimited,
                    retry_after,
                })
            }
            403 => {
                if let Some(domain) = domain {
                    self.limiter
                        .report_forbidden(domain, url, retry_after.is_some())
                        .await;
                }
                Err(AttemptOutcome::Retry {
                    error: FetchError::Blocked {
                        url: url.to_string(),
                        status,
                    },
                    signal: BackoffSignal::BotSuspected,
                    retry_after,
                })
            }
            503 => {
                if let Some(domain) = domain {
                    self.limiter.report_rate_limit(domain, status).await;
                }
                Err(AttemptOutcome::Retry {
                    error: FetchError::Blocked {
                        url: url.to_string(),
                        status,
                    },
                    signal: BackoffSignal::BotSuspected,
                    retry_after,
                })
            }
            500..=599 => {
                if let Some(domain) = domain {
                    self.limiter.report_server_error(domain).await;
                }
                Err(AttemptOutcome::Retry {
                    error: FetchError::Network {
                        url: url.to_string(),
                        message: format!("HTTP {}", status),
                    },
                    signal: BackoffSignal::Normal,
                    retry_after: None,
                })
            }
            // Remaining 4xx are permanent for this URL; retrying wastes
            // the domain's request budget
            _ => Err(AttemptOutcome::Fatal(FetchError::Blocked {
                url: url.to_string(),
                status,
            })),
        }
    }
}

enum AttemptOutcome {
    Fatal(FetchError),
    Retry {
        error: FetchError,
        signal: BackoffSignal,
        retry_after: Option<Duration>,
    },
}

#[async_trait]
impl PageSource for PageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.fetch(url).await
    }
}
