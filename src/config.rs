//! Application settings.
//!
//! Loaded from a TOML file (`~/.config/pricetrawl/config.toml` by default,
//! overridable via `PRICETRAWL_CONFIG`), with the data directory
//! overridable via `PRICETRAWL_DATA_DIR`. A missing or unreadable file
//! degrades to defaults; a broken config never aborts a run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fetch::FetchSettings;
use crate::llm::LlmConfig;
use crate::matcher::MatchWeights;

/// Default marketplace lookup cache TTL in hours.
pub const DEFAULT_MARKETPLACE_TTL_HOURS: i64 = 24;

/// Default supplier record cache TTL in hours (7 days).
pub const DEFAULT_SUPPLIER_TTL_HOURS: i64 = 168;

/// Cache TTL settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_marketplace_ttl_hours")]
    pub marketplace_ttl_hours: i64,
    #[serde(default = "default_supplier_ttl_hours")]
    pub supplier_ttl_hours: i64,
}

fn default_marketplace_ttl_hours() -> i64 {
    DEFAULT_MARKETPLACE_TTL_HOURS
}
fn default_supplier_ttl_hours() -> i64 {
    DEFAULT_SUPPLIER_TTL_HOURS
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            marketplace_ttl_hours: default_marketplace_ttl_hours(),
            supplier_ttl_hours: default_supplier_ttl_hours(),
        }
    }
}

/// Crawl tuning not tied to a single domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Concurrent category workers per run.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Cap on category candidates taken from homepage discovery.
    #[serde(default = "default_max_categories")]
    pub max_categories: usize,
    /// Product containers needed before a listing counts as healthy.
    #[serde(default = "default_min_containers")]
    pub min_containers: usize,
}

fn default_workers() -> usize {
    4
}
fn default_max_categories() -> usize {
    25
}
fn default_min_containers() -> usize {
    3
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_categories: default_max_categories(),
            min_containers: default_min_containers(),
        }
    }
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory for domain configs, crawl history, and caches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub crawl: CrawlSettings,
    #[serde(default)]
    pub matcher: MatchWeights,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheSettings,
}

impl Settings {
    /// Load settings from the configured path, degrading to defaults on
    /// any failure.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load settings from an explicit path.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(
                        "Config file {} unreadable ({}), using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Config file path: `PRICETRAWL_CONFIG` or the platform config dir.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PRICETRAWL_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pricetrawl")
            .join("config.toml")
    }

    /// Data directory: explicit setting, `PRICETRAWL_DATA_DIR`, or the
    /// platform data dir.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        if let Ok(dir) = std::env::var("PRICETRAWL_DATA_DIR") {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pricetrawl")
    }

    /// Directory of per-domain selector configs.
    pub fn domains_dir(&self) -> PathBuf {
        self.data_dir().join("domains")
    }

    /// Directory of per-supplier crawl histories.
    pub fn history_dir(&self) -> PathBuf {
        self.data_dir().join("history")
    }

    /// Directory of cache stores.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir().join("cache")
    }

    /// Directory of extracted product record files.
    pub fn products_dir(&self) -> PathBuf {
        self.data_dir().join("products")
    }

    pub fn marketplace_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache.marketplace_ttl_hours)
    }

    pub fn supplier_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache.supplier_ttl_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let settings = Settings::load_from(Path::new("/nonexistent/config.toml"));
        assert_eq!(settings.crawl.workers, 4);
        assert_eq!(settings.fetch.max_attempts, 4);
    }

    #[test]
    fn test_broken_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is [not valid toml").unwrap();
        let settings = Settings::load_from(&path);
        assert_eq!(settings.crawl.workers, 4);
    }

    #[test]
    fn test_partial_file_overrides_selected_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[crawl]
workers = 8

[fetch]
request_delay_ms = 3000

[matcher]
identifier_match = 0.7
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.crawl.workers, 8);
        assert_eq!(settings.fetch.request_delay_ms, 3000);
        assert_eq!(settings.matcher.identifier_match, 0.7);
        // Untouched fields keep their defaults
        assert_eq!(settings.crawl.max_categories, 25);
        assert_eq!(settings.matcher.brand, 0.25);
    }

    #[test]
    fn test_settings_roundtrip_through_toml() {
        let settings = Settings::default();
        let serialized = toml::to_string(&settings).unwrap();
        let reparsed: Settings = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.crawl, settings.crawl);
        assert_eq!(reparsed.fetch, settings.fetch);
    }
}
