//! pricetrawl - supplier catalog extraction and marketplace price matching.
//!
//! A tool for crawling supplier e-commerce sites, extracting product
//! records, and price-matching them against a reference marketplace.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pricetrawl::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "pricetrawl=info"
    } else {
        "pricetrawl=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
