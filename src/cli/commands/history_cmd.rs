//! Crawl history commands.

use clap::Subcommand;
use console::style;

use crate::config::Settings;
use crate::crawl::history::HistoryStore;

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Show a supplier's crawl history summary
    Show { supplier: String },
    /// Clear a supplier's crawl history
    Clear { supplier: String },
}

pub fn cmd_history(settings: &Settings, action: HistoryAction) -> anyhow::Result<()> {
    let store = HistoryStore::new(settings.history_dir());

    match action {
        HistoryAction::Show { supplier } => {
            let history = store.load(&supplier);
            println!("supplier:            {}", supplier);
            println!("visited urls:        {}", history.visited_urls.len());
            println!("categories complete: {}", history.categories_scraped.len());
            match history.last_run {
                Some(at) => println!("last run:            {}", at.to_rfc3339()),
                None => println!("last run:            never"),
            }
        }
        HistoryAction::Clear { supplier } => {
            store.clear(&supplier)?;
            println!("{} History cleared for {}", style("✓").green(), supplier);
        }
    }

    Ok(())
}
