//! Per-domain selector configuration.
//!
//! Extraction behavior is data, not code: each domain gets a JSON document
//! mapping semantic fields to ordered lists of selector rules. New domains
//! need new configuration, never new code. Configs are cached in memory as
//! immutable snapshots; rewrites (from AI-assisted discovery) clone,
//! mutate, persist, and atomically swap the snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Semantic fields a selector rule can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Title,
    Price,
    Identifier,
    Image,
    Url,
    NextPage,
    ProductContainer,
}

impl Field {
    /// Default attribute to read for this field when a rule names none.
    pub fn default_attribute(&self) -> Option<&'static str> {
        match self {
            Field::Image => Some("src"),
            Field::Url | Field::NextPage => Some("href"),
            _ => None,
        }
    }
}

/// One extraction rule: a CSS selector, an optional attribute to read
/// instead of text content, and an optional post-processing regex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorRule {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Regex applied to the raw value; the capture group is the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_process: Option<String>,
    #[serde(default = "default_capture_group")]
    pub capture_group: usize,
}

fn default_capture_group() -> usize {
    1
}

impl SelectorRule {
    pub fn new(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            attribute: None,
            post_process: None,
            capture_group: 1,
        }
    }

    pub fn with_attribute(selector: &str, attribute: &str) -> Self {
        Self {
            attribute: Some(attribute.to_string()),
            ..Self::new(selector)
        }
    }

    /// A rule is usable if its selector is non-empty and, when a
    /// post-process pattern is set, the pattern compiles and contains the
    /// configured capture group.
    pub fn is_valid(&self) -> bool {
        if self.selector.trim().is_empty() {
            return false;
        }
        match &self.post_process {
            None => true,
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => re.captures_len() > self.capture_group,
                Err(_) => false,
            },
        }
    }
}

fn default_max_category_pages() -> u32 {
    50
}

/// Selector configuration for one supplier domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub domain: String,
    /// Ordered rule lists per field; first rule yielding a value wins.
    #[serde(default)]
    pub field_rules: HashMap<Field, Vec<SelectorRule>>,
    /// URL pattern with a `{page}` placeholder for constructed pagination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination_pattern: Option<String>,
    /// Hard cap on pages crawled per category.
    #[serde(default = "default_max_category_pages")]
    pub max_category_pages: u32,
}

impl DomainConfig {
    pub fn empty(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            field_rules: HashMap::new(),
            pagination_pattern: None,
            max_category_pages: default_max_category_pages(),
        }
    }

    /// Rules for a field, in priority order. Empty slice when unset.
    pub fn rules(&self, field: Field) -> &[SelectorRule] {
        self.field_rules.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Prepend rules for a field, keeping existing rules as fallback.
    ///
    /// Newly discovered selectors take priority but never discard what
    /// already worked; duplicates (same selector + attribute) are dropped.
    pub fn merge_prepend(&mut self, field: Field, new_rules: Vec<SelectorRule>) {
        let existing = self.field_rules.entry(field).or_default();
        let mut merged: Vec<SelectorRule> = new_rules
            .into_iter()
            .filter(|r| r.is_valid())
            .collect();
        for rule in existing.drain(..) {
            if !merged
                .iter()
                .any(|r| r.selector == rule.selector && r.attribute == rule.attribute)
            {
                merged.push(rule);
            }
        }
        *existing = merged;
    }
}

/// Filesystem-backed store of per-domain configs with an in-memory
/// snapshot cache.
pub struct SelectorStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<DomainConfig>>>,
}

impl SelectorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn config_path(&self, domain: &str) -> PathBuf {
        let safe: String = domain
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    /// Get the config snapshot for a domain, loading it from disk on
    /// first encounter. A missing or unreadable file degrades to an empty
    /// config rather than failing the run.
    pub async fn get(&self, domain: &str) -> Arc<DomainConfig> {
        {
            let cache = self.cache.read().await;
            if let Some(config) = cache.get(domain) {
                return config.clone();
            }
        }

        let config = Arc::new(self.load_from_disk(domain));
        let mut cache = self.cache.write().await;
        cache
            .entry(domain.to_string())
            .or_insert_with(|| config.clone())
            .clone()
    }

    /// Rewrite a domain's config: copy the current snapshot, apply the
    /// mutation, persist, and swap the cached snapshot atomically.
    pub async fn update<F>(&self, domain: &str, mutate: F) -> anyhow::Result<Arc<DomainConfig>>
    where
        F: FnOnce(&mut DomainConfig),
    {
        let current = self.get(domain).await;
        let mut next = (*current).clone();
        mutate(&mut next);

        self.save_to_disk(&next)?;

        let snapshot = Arc::new(next);
        let mut cache = self.cache.write().await;
        cache.insert(domain.to_string(), snapshot.clone());
        Ok(snapshot)
    }

    fn load_from_disk(&self, domain: &str) -> DomainConfig {
        let path = self.config_path(domain);
        if !path.exists() {
            debug!("No selector config for {}, starting empty", domain);
            return DomainConfig::empty(domain);
        }
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<DomainConfig>(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!(
                        "Selector config for {} unreadable ({}), starting empty",
                        domain, e
                    );
                    DomainConfig::empty(domain)
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}, starting empty", path.display(), e);
                DomainConfig::empty(domain)
            }
        }
    }

    fn save_to_disk(&self, config: &DomainConfig) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.config_path(&config.domain);
        write_json_atomic(&path, config)
    }
}

/// Serialize a value to JSON and replace `path` atomically
/// (write-temp-then-rename in the destination directory).
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.persist(path)?;
    Ok(())
}
