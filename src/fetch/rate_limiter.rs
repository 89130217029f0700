//! Adaptive per-domain request gating.
//!
//! All fetch tasks for a domain serialize through one gate that enforces a
//! minimum inter-request interval. The interval adapts: definite rate
//! limiting (429, 503) multiplies it, repeated 403s across distinct URLs
//! are treated as bot detection, and sustained success walks it back down
//! to the base delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::utils::url::domain_of;

/// Gate tuning.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum inter-request interval when the domain is healthy.
    pub base_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Interval multiplier on a rate-limit signal.
    pub backoff_multiplier: f64,
    /// Interval multiplier during recovery (< 1).
    pub recovery_multiplier: f64,
    /// Consecutive successes needed before one recovery step.
    pub recovery_threshold: u32,
    /// Distinct URLs receiving 403 inside `blocked_window` that flip the
    /// domain into backoff.
    pub blocked_url_threshold: usize,
    pub blocked_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1500),
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.5,
            recovery_threshold: 5,
            blocked_url_threshold: 3,
            blocked_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct DomainState {
    current_delay: Duration,
    last_request: Option<Instant>,
    in_backoff: bool,
    consecutive_successes: u32,
    total_requests: u64,
    rate_limit_hits: u64,
    /// (url, seen_at) of recent 403 responses for pattern detection.
    recent_blocked: Vec<(String, Instant)>,
}

impl DomainState {
    fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            last_request: None,
            in_backoff: false,
            consecutive_successes: 0,
            total_requests: 0,
            rate_limit_hits: 0,
            recent_blocked: Vec::new(),
        }
    }

    fn time_until_ready(&self) -> Duration {
        match self.last_request {
            None => Duration::ZERO,
            Some(at) => self.current_delay.saturating_sub(at.elapsed()),
        }
    }

    /// Record a 403 and report whether distinct URLs within the window
    /// cross the pattern threshold.
    fn note_blocked(&mut self, url: &str, window: Duration, threshold: usize) -> bool {
        let now = Instant::now();
        self.recent_blocked
            .retain(|(_, at)| now.duration_since(*at) < window);
        if !self.recent_blocked.iter().any(|(u, _)| u == url) {
            self.recent_blocked.push((url.to_string(), now));
        }
        self.recent_blocked.len() >= threshold
    }
}

/// Per-domain snapshot for reporting.
#[derive(Debug, Clone)]
pub struct DomainStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

/// Shared adaptive rate limiter; cheap to clone.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Wait until the URL's domain is ready, then mark a request started.
    /// Returns the domain for subsequent reporting.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = domain_of(url)?;

        let wait = {
            let domains = self.domains.read().await;
            domains
                .get(&domain)
                .map(|s| s.time_until_ready())
                .unwrap_or(Duration::ZERO)
        };
        if wait > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }

        let mut domains = self.domains.write().await;
        let state = domains
            .entry(domain.clone())
            .or_insert_with(|| DomainState::new(self.config.base_delay));
        state.last_request = Some(Instant::now());
        state.total_requests += 1;

        Some(domain)
    }

    /// Successful response: may step the interval back toward base.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes += 1;
            state.recent_blocked.clear();

            if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
                let reduced = Duration::from_secs_f64(
                    state.current_delay.as_secs_f64() * self.config.recovery_multiplier,
                );
                state.current_delay = reduced.max(self.config.min_delay);

                if state.current_delay <= self.config.base_delay {
                    state.in_backoff = false;
                    state.current_delay = self.config.base_delay;
                    info!("Domain {} recovered from backoff", domain);
                } else {
                    debug!("Domain {} delay reduced to {:?}", domain, state.current_delay);
                }
                state.consecutive_successes = 0;
            }
        }
    }

    /// Definite rate limit (429 or 503): multiply the interval.
    pub async fn report_rate_limit(&self, domain: &str, status: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.rate_limit_hits += 1;
            state.consecutive_successes = 0;
            state.in_backoff = true;
            state.recent_blocked.clear();

            let raised = Duration::from_secs_f64(
                state.current_delay.as_secs_f64() * self.config.backoff_multiplier,
            );
            state.current_delay = raised.min(self.config.max_delay);

            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                domain, status, state.current_delay
            );
        }
    }

    /// 403 response: backs off only on a Retry-After header or a pattern
    /// of distinct URLs being denied. Returns true when treated as rate
    /// limiting rather than plain access denial.
    pub async fn report_forbidden(&self, domain: &str, url: &str, has_retry_after: bool) -> bool {
        let mut domains = self.domains.write().await;
        let Some(state) = domains.get_mut(domain) else {
            return false;
        };
        state.consecutive_successes = 0;

        let pattern = state.note_blocked(
            url,
            self.config.blocked_window,
            self.config.blocked_url_threshold,
        );
        if !(has_retry_after || pattern) {
            debug!("403 from {} for {} - treating as access denied", domain, url);
            return false;
        }

        state.rate_limit_hits += 1;
        state.in_backoff = true;
        state.recent_blocked.clear();

        let raised = Duration::from_secs_f64(
            state.current_delay.as_secs_f64() * self.config.backoff_multiplier,
        );
        state.current_delay = raised.min(self.config.max_delay);

        warn!(
            "Bot detection suspected on {} (403 pattern), backing off to {:?}",
            domain, state.current_delay
        );
        true
    }

    /// Non-503 5xx: mild backoff, the server may just be overloaded.
    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            let raised = Duration::from_secs_f64(state.current_delay.as_secs_f64() * 1.5);
            state.current_delay = raised.min(self.config.max_delay);
            debug!(
                "Server error from {}, delay raised to {:?}",
                domain, state.current_delay
            );
        }
    }

    /// Current enforced interval for a domain.
    pub async fn current_delay(&self, domain: &str) -> Duration {
        let domains = self.domains.read().await;
        domains
            .get(domain)
            .map(|s| s.current_delay)
            .unwrap_or(self.config.base_delay)
    }

    /// Snapshot of all domain gates.
    pub async fn stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .map(|(domain, state)| {
                (
                    domain.clone(),
                    DomainStats {
                        current_delay: state.current_delay,
                        in_backoff: state.in_backoff,
                        total_requests: state.total_requests,
                        rate_limit_hits: state.rate_limit_hits,
                    },
                )
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
