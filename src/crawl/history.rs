//! Crawl history persistence.
//!
//! One JSON document per supplier, rewritten atomically on each
//! checkpoint so a crashed or cancelled run resumes without re-crawling.
//! An unreadable document degrades to an empty history; the run continues
//! with reduced dedup fidelity instead of aborting.

use std::path::PathBuf;

use tracing::warn;

use crate::models::CrawlHistory;
use crate::selectors::write_json_atomic;

/// Filesystem store of per-supplier crawl histories.
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, supplier: &str) -> PathBuf {
        let safe: String = supplier
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    /// Load a supplier's history, degrading to empty on any failure.
    pub fn load(&self, supplier: &str) -> CrawlHistory {
        let path = self.path(supplier);
        if !path.exists() {
            return CrawlHistory::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(history) => history,
                Err(e) => {
                    warn!(
                        "Crawl history for {} unreadable ({}), starting empty",
                        supplier, e
                    );
                    CrawlHistory::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}, starting empty", path.display(), e);
                CrawlHistory::default()
            }
        }
    }

    /// Checkpoint a supplier's history atomically.
    pub fn save(&self, supplier: &str, history: &CrawlHistory) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        write_json_atomic(&self.path(supplier), history)
    }

    /// Drop a supplier's history.
    pub fn clear(&self, supplier: &str) -> anyhow::Result<()> {
        let path = self.path(supplier);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
