//! Crawl frontier management.
//!
//! One run per supplier: discover category candidates from the start
//! page, then crawl each category's pagination chain. Categories run
//! concurrently under a bounded worker count; pages within one category
//! are strictly sequential, since page N+1's URL may depend on page N's
//! content. Every discovered URL is deduplicated against the persisted
//! crawl history before fetching, and the history is checkpointed after
//! each page so an interrupted run resumes where it stopped.

pub mod categories;
pub mod history;
pub mod pagination;

use std::sync::Arc;

use chrono::Utc;
use scraper::Html;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::discovery::SelectorDiscovery;
use crate::extract::ListingExtractor;
use crate::fetch::{FetchError, PageSource};
use crate::models::{CrawlHistory, RunPhase, RunSummary, SupplierProduct};
use crate::selectors::SelectorStore;
use crate::utils::url::{base_form, domain_of};
use categories::discover_categories;
use history::HistoryStore;

/// Per-run options.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Supplier name, the crawl-history key.
    pub supplier: String,
    /// Homepage or category URL to start from.
    pub start_url: String,
    /// Concurrent category workers.
    pub workers: usize,
    /// Cap on category candidates taken from discovery.
    pub max_categories: usize,
    /// Override for the per-domain page cap.
    pub max_pages: Option<u32>,
}

/// Outcome of a crawl run.
pub struct RunReport {
    pub summary: RunSummary,
    pub products: Vec<SupplierProduct>,
}

/// Drives one supplier crawl run.
pub struct Crawler {
    options: CrawlOptions,
    shared: Arc<Shared>,
}

/// State shared across category workers.
struct Shared {
    supplier: String,
    store: Arc<SelectorStore>,
    source: Arc<dyn PageSource>,
    discovery: Option<Arc<SelectorDiscovery>>,
    history_store: Arc<HistoryStore>,
    history: Mutex<CrawlHistory>,
    summary: Arc<Mutex<RunSummary>>,
    products: Mutex<Vec<SupplierProduct>>,
    cancel: CancellationToken,
    max_pages: Option<u32>,
}

impl Shared {
    /// Record a visited page and checkpoint the history. Checkpoint
    /// failures are logged, never fatal.
    async fn record_and_checkpoint(&self, url: &str) {
        let mut history = self.history.lock().await;
        history.record_visit(url);
        if let Err(e) = self.history_store.save(&self.supplier, &history) {
            warn!("Failed to checkpoint crawl history: {}", e);
        }
    }

    async fn finish_category(&self, category_url: &str) {
        let mut history = self.history.lock().await;
        history.record_category(category_url);
        if let Err(e) = self.history_store.save(&self.supplier, &history) {
            warn!("Failed to checkpoint crawl history: {}", e);
        }
    }
}

impl Crawler {
    pub fn new(
        options: CrawlOptions,
        store: Arc<SelectorStore>,
        source: Arc<dyn PageSource>,
        discovery: Option<Arc<SelectorDiscovery>>,
        history_store: Arc<HistoryStore>,
        cancel: CancellationToken,
    ) -> Self {
        let history = history_store.load(&options.supplier);
        let shared = Arc::new(Shared {
            supplier: options.supplier.clone(),
            store,
            source,
            discovery,
            history_store,
            history: Mutex::new(history),
            summary: Arc::new(Mutex::new(RunSummary::new(&options.supplier))),
            products: Mutex::new(Vec::new()),
            cancel,
            max_pages: options.max_pages,
        });
        Self { options, shared }
    }

    /// Live view of the run summary, for progress reporting.
    pub fn summary_handle(&self) -> Arc<Mutex<RunSummary>> {
        self.shared.summary.clone()
    }

    /// Run the crawl to completion (or cancellation). The history is
    /// flushed before returning in either case, so the run is resumable.
    pub async fn run(self) -> anyhow::Result<RunReport> {
        let start_page = match self.shared.source.fetch_page(&self.options.start_url).await {
            Ok(page) => page,
            Err(e) => anyhow::bail!("start page unreachable: {}", e),
        };

        self.set_phase(RunPhase::DiscoveringCategories).await;
        let base = Url::parse(&start_page.final_url)
            .or_else(|_| Url::parse(&self.options.start_url))?;

        let mut category_urls: Vec<String> = {
            let html = Html::parse_document(&start_page.html);
            discover_categories(&html, &base)
                .into_iter()
                .take(self.options.max_categories)
                .map(|c| c.url)
                .collect()
        };
        if category_urls.is_empty() {
            // A start URL that is itself a listing page is its own category
            debug!("No category candidates found, crawling start URL directly");
            category_urls.push(self.options.start_url.clone());
        }

        // Dedup discovered categories in increasing cost order: exact
        // completed-set membership, then base-form comparison against
        // completed categories (catches ?ref= style variants of one page)
        let already_done = {
            let history = self.shared.history.lock().await;
            let done_bases: std::collections::HashSet<String> = history
                .categories_scraped
                .iter()
                .map(|u| base_form(u))
                .collect();
            let before = category_urls.len();
            category_urls.retain(|url| {
                !history.category_done(url) && !done_bases.contains(&base_form(url))
            });
            before - category_urls.len()
        };
        {
            let mut summary = self.shared.summary.lock().await;
            summary.categories.attempted = (category_urls.len() + already_done) as u64;
            summary.categories.skipped = already_done as u64;
        }
        info!(
            "{}: crawling {} categories ({} already complete)",
            self.options.supplier,
            category_urls.len(),
            already_done
        );

        self.set_phase(RunPhase::CrawlingCategories).await;
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut handles = Vec::with_capacity(category_urls.len());
        for category_url in category_urls {
            let shared = self.shared.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if shared.cancel.is_cancelled() {
                    return;
                }
                crawl_category(shared, category_url).await;
            }));
        }
        futures::future::join_all(handles).await;

        // Final flush covers the cancellation path too
        {
            let mut history = self.shared.history.lock().await;
            history.last_run = Some(Utc::now());
            if let Err(e) = self
                .shared
                .history_store
                .save(&self.options.supplier, &history)
            {
                warn!("Failed to flush crawl history: {}", e);
            }
        }
        self.set_phase(RunPhase::RunComplete).await;

        let summary = self.shared.summary.lock().await.clone();
        let products = std::mem::take(&mut *self.shared.products.lock().await);
        info!(
            "{}: run complete, {} pages fetched, {} products extracted",
            self.options.supplier, summary.pages.succeeded, summary.products.succeeded
        );
        Ok(RunReport { summary, products })
    }

    async fn set_phase(&self, phase: RunPhase) {
        self.shared.summary.lock().await.phase = phase;
    }
}

/// Crawl one category's pagination chain sequentially.
async fn crawl_category(shared: Arc<Shared>, category_url: String) {
    let Some(domain) = domain_of(&category_url) else {
        warn!("Skipping category with unparseable URL: {}", category_url);
        return;
    };

    let max_pages = {
        let config = shared.store.get(&domain).await;
        shared.max_pages.unwrap_or(config.max_category_pages).max(1)
    };

    let mut url = category_url.clone();
    let mut page_num = 1u32;
    // An abandoned chain stays unfinished so a later run retries it
    let mut completed = true;

    loop {
        if shared.cancel.is_cancelled() {
            debug!("Cancellation requested, stopping category {}", category_url);
            return;
        }

        // Dedup: exact set, then hash index (base-form collapse would
        // merge distinct pagination pages, so it is not used here)
        let visited = { shared.history.lock().await.is_visited(&url) };
        if visited {
            shared.summary.lock().await.pages.skipped += 1;
            // Skip past a visited page without re-fetching when the next
            // URL can be constructed from pattern or structure alone
            let constructed = {
                let config = shared.store.get(&domain).await;
                Url::parse(&url).ok().and_then(|u| {
                    pagination::construct_next_without_content(&u, &config, page_num)
                })
            };
            match constructed {
                Some(next) if page_num < max_pages => {
                    debug!("Page already visited, advancing to {}", next);
                    url = next;
                    page_num += 1;
                    continue;
                }
                _ => break,
            }
        }

        shared.summary.lock().await.pages.attempted += 1;
        let page = match shared.source.fetch_page(&url).await {
            Ok(page) => page,
            Err(FetchError::Cancelled) => return,
            Err(e) => {
                // Bounded retries already happened inside the fetcher;
                // without this page's content the chain cannot continue
                warn!("Abandoning category {} at page {}: {}", category_url, page_num, e);
                completed = false;
                break;
            }
        };
        shared.record_and_checkpoint(&url).await;
        shared.summary.lock().await.pages.succeeded += 1;

        // Discovery fallback may install working selectors before
        // extraction; failures inside it are soft
        if let Some(discovery) = &shared.discovery {
            if let Err(e) = discovery.ensure_selectors(&domain, &page.html, None).await {
                warn!("Selector discovery failed for {}: {}", domain, e);
            }
        }

        let config = shared.store.get(&domain).await;
        let page_url = Url::parse(&page.final_url)
            .or_else(|_| Url::parse(&url))
            .ok();
        let Some(page_url) = page_url else {
            break;
        };

        let (container_count, extracted, next) = {
            let html = Html::parse_document(&page.html);
            let extractor = ListingExtractor::new(config.clone());
            let containers = extractor.container_count(&html);
            let products = extractor.products(&html, &page_url, &category_url);
            let next = pagination::find_next_page(&html, &page_url, &config, page_num);
            (containers, products, next)
        };

        {
            let mut summary = shared.summary.lock().await;
            summary.products.attempted += container_count as u64;
            summary.products.succeeded += extracted.len() as u64;
        }
        let found_products = !extracted.is_empty();
        if found_products {
            shared.products.lock().await.extend(extracted);
        }

        // Termination: no next-page signal, a next page already visited,
        // or the page cap
        let Some(next_url) = next else {
            debug!("Category {} exhausted after {} pages", category_url, page_num);
            break;
        };
        if !found_products && container_count == 0 {
            debug!(
                "Category {} yields no products at page {}, stopping",
                category_url, page_num
            );
            break;
        }
        if page_num >= max_pages {
            info!(
                "Category {} hit the {}-page cap",
                category_url, max_pages
            );
            break;
        }
        let next_visited = { shared.history.lock().await.is_visited(&next_url) };
        if next_visited {
            debug!("Next page {} already visited, stopping", next_url);
            break;
        }

        url = next_url;
        page_num += 1;
    }

    if completed {
        shared.finish_category(&category_url).await;
        shared.summary.lock().await.categories.succeeded += 1;
    }
}
