//! Crawl command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::crawl::history::HistoryStore;
use crate::crawl::{CrawlOptions, Crawler};
use crate::discovery::SelectorDiscovery;
use crate::fetch::{PageFetcher, RateLimiter};
use crate::llm::AnalysisClient;
use crate::models::StageCounts;
use crate::selectors::{write_json_atomic, SelectorStore};

/// Crawl a supplier site and extract product records.
pub async fn cmd_crawl(
    settings: &Settings,
    supplier: &str,
    url: &str,
    workers: Option<usize>,
    max_pages: Option<u32>,
    max_categories: Option<usize>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    {
        // First Ctrl-C requests a graceful stop; the run still flushes
        // history before exiting
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} Cancelling run, flushing history...", style("!").yellow());
                cancel.cancel();
            }
        });
    }

    let limiter = RateLimiter::with_config(settings.fetch.rate_limit_config());
    let fetcher = Arc::new(PageFetcher::new(
        settings.fetch.clone(),
        limiter.clone(),
        cancel.clone(),
    ));
    let store = Arc::new(SelectorStore::new(settings.domains_dir()));
    let history_store = Arc::new(HistoryStore::new(settings.history_dir()));

    let discovery = if settings.llm.enabled {
        let client = Arc::new(AnalysisClient::new(settings.llm.clone()));
        if !client.is_available().await {
            println!(
                "{} Analysis service not reachable at {}, falling back to heuristics",
                style("!").yellow(),
                settings.llm.endpoint
            );
        }
        Some(Arc::new(
            SelectorDiscovery::new(client, store.clone())
                .with_min_containers(settings.crawl.min_containers),
        ))
    } else {
        None
    };

    let options = CrawlOptions {
        supplier: supplier.to_string(),
        start_url: url.to_string(),
        workers: workers.unwrap_or(settings.crawl.workers),
        max_categories: max_categories.unwrap_or(settings.crawl.max_categories),
        max_pages,
    };

    println!(
        "{} Crawling {} starting at {}",
        style("→").cyan(),
        style(supplier).bold(),
        url
    );

    let crawler = Crawler::new(options, store, fetcher, discovery, history_store, cancel);
    let summary_handle = crawler.summary_handle();

    // Progress spinner fed from the shared run summary
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static template"),
    );
    progress.enable_steady_tick(Duration::from_millis(120));
    let progress_task = {
        let progress = progress.clone();
        let summary_handle = summary_handle.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(250)).await;
                let summary = summary_handle.lock().await.clone();
                progress.set_message(format!(
                    "pages {} | products {} | categories {}/{}",
                    summary.pages.succeeded,
                    summary.products.succeeded,
                    summary.categories.succeeded + summary.categories.skipped,
                    summary.categories.attempted,
                ));
            }
        })
    };

    let report = crawler.run().await;
    progress_task.abort();
    progress.finish_and_clear();
    let report = report?;

    let out_path = output.unwrap_or_else(|| {
        settings
            .products_dir()
            .join(format!("{}-{}.json", supplier, report.summary.run_id))
    });
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_json_atomic(&out_path, &report.products)?;

    println!(
        "{} Run complete: {} products from {} pages",
        style("✓").green(),
        style(report.products.len()).bold(),
        report.summary.pages.succeeded
    );
    print_stage("pages", &report.summary.pages);
    print_stage("products", &report.summary.products);
    print_stage("categories", &report.summary.categories);
    println!("  records written to {}", out_path.display());

    let stats = limiter.stats().await;
    for (domain, stat) in stats {
        if stat.in_backoff || stat.rate_limit_hits > 0 {
            println!(
                "{} {} ended in backoff ({} rate-limit hits, {:?} delay)",
                style("!").yellow(),
                domain,
                stat.rate_limit_hits,
                stat.current_delay
            );
        }
    }

    Ok(())
}

fn print_stage(name: &str, counts: &StageCounts) {
    println!(
        "  {:<12} attempted {:>5}  succeeded {:>5}  skipped {:>5}  failed {:>5}",
        name,
        counts.attempted,
        counts.succeeded,
        counts.skipped,
        counts.failed()
    );
}
