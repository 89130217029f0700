//! Crawl run state: visited-URL history and per-stage counters.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::url::{base_form, url_hash};

/// Phase of a supplier crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    DiscoveringCategories,
    CrawlingCategories,
    RunComplete,
}

/// Visited-URL history for one supplier, persisted across runs.
///
/// Membership is checked at three levels in increasing cost order: the
/// exact visited set, the normalized-URL hash index, and the
/// scheme+host+path base form. Every URL recorded in `visited_urls` also
/// has an entry in `url_hash_index`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlHistory {
    #[serde(default)]
    pub visited_urls: HashSet<String>,
    /// Normalized-URL hash -> original URL.
    #[serde(default)]
    pub url_hash_index: HashMap<String, String>,
    /// Category pages whose pagination chain was fully crawled.
    #[serde(default)]
    pub categories_scraped: HashSet<String>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl CrawlHistory {
    /// Record a visited URL in both the exact set and the hash index.
    pub fn record_visit(&mut self, url: &str) {
        self.visited_urls.insert(url.to_string());
        self.url_hash_index.insert(url_hash(url), url.to_string());
    }

    /// Mark a category's pagination chain as fully crawled.
    pub fn record_category(&mut self, category_url: &str) {
        self.categories_scraped.insert(category_url.to_string());
    }

    /// Whether a category was already fully crawled.
    pub fn category_done(&self, category_url: &str) -> bool {
        self.categories_scraped.contains(category_url)
    }

    /// Three-layer membership test: exact match, normalized-hash match,
    /// then base-form comparison against previously visited URLs.
    pub fn is_visited(&self, url: &str) -> bool {
        if self.visited_urls.contains(url) {
            return true;
        }
        if self.url_hash_index.contains_key(&url_hash(url)) {
            return true;
        }
        false
    }

    /// Loosest check: does any visited URL share this URL's
    /// scheme+host+path, ignoring query parameters entirely?
    ///
    /// Used only where pagination variants must collapse; too aggressive
    /// for general dedup since `?page=2` would collapse into `?page=1`.
    pub fn base_visited(&self, url: &str) -> bool {
        let base = base_form(url);
        self.visited_urls.iter().any(|v| base_form(v) == base)
    }

    pub fn len(&self) -> usize {
        self.visited_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited_urls.is_empty()
    }
}

/// Attempted/succeeded/skipped counters for one pipeline stage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageCounts {
    pub attempted: u64,
    pub succeeded: u64,
    pub skipped: u64,
}

impl StageCounts {
    pub fn failed(&self) -> u64 {
        self.attempted
            .saturating_sub(self.succeeded)
            .saturating_sub(self.skipped)
    }
}

/// Per-stage counters for one crawl run, reported at completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub supplier: String,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    /// Category listing pages fetched.
    pub pages: StageCounts,
    /// Product records extracted from fetched pages.
    pub products: StageCounts,
    /// Categories processed.
    pub categories: StageCounts,
}

impl RunSummary {
    pub fn new(supplier: &str) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            supplier: supplier.to_string(),
            phase: RunPhase::Init,
            started_at: Utc::now(),
            pages: StageCounts::default(),
            products: StageCounts::default(),
            categories: StageCounts::default(),
        }
    }
}
