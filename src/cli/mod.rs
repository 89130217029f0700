//! Command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};

/// Supplier catalog extraction and marketplace price matching.
#[derive(Parser)]
#[command(name = "ptrawl", version, about)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Crawl a supplier site and extract product records
    Crawl {
        /// Supplier name (crawl-history key)
        supplier: String,
        /// Homepage or category URL to start from
        url: String,
        /// Concurrent category workers
        #[arg(short, long)]
        workers: Option<usize>,
        /// Page cap per category (overrides the domain config)
        #[arg(long)]
        max_pages: Option<u32>,
        /// Category candidate cap
        #[arg(long)]
        max_categories: Option<usize>,
        /// Write extracted records to this JSON file instead of the data dir
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
    /// Match extracted supplier records against marketplace listings
    Match {
        /// JSON file of extracted supplier records
        products: std::path::PathBuf,
        /// JSON file of marketplace listings
        listings: std::path::PathBuf,
        /// Write match results to this JSON file
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
        /// Only print matches at or above this tier (high, medium, low)
        #[arg(long, default_value = "low")]
        min_tier: String,
    },
    /// Inspect or edit per-domain selector configuration
    Config {
        #[command(subcommand)]
        action: commands::config_cmd::ConfigAction,
    },
    /// Inspect or clear a supplier's crawl history
    History {
        #[command(subcommand)]
        action: commands::history_cmd::HistoryAction,
    },
}

/// Check argv for the verbose flag before clap parsing, so logging can be
/// initialized first.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Parse arguments and dispatch.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = crate::config::Settings::load();

    match cli.command {
        Command::Crawl {
            supplier,
            url,
            workers,
            max_pages,
            max_categories,
            output,
        } => {
            commands::crawl::cmd_crawl(
                &settings,
                &supplier,
                &url,
                workers,
                max_pages,
                max_categories,
                output,
            )
            .await
        }
        Command::Match {
            products,
            listings,
            output,
            min_tier,
        } => commands::match_cmd::cmd_match(&settings, &products, &listings, output, &min_tier).await,
        Command::Config { action } => commands::config_cmd::cmd_config(&settings, action).await,
        Command::History { action } => commands::history_cmd::cmd_history(&settings, action),
    }
}
