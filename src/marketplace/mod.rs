//! Marketplace lookup boundary.
//!
//! The marketplace is an external collaborator: lookups are black-box,
//! retryable, cacheable calls. This module defines the seam, a file-backed
//! implementation for offline matching runs, and a caching wrapper that
//! avoids redundant lookups within the configured TTL.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Duration;
use tracing::debug;

use crate::cache::Store;
use crate::models::{gtin14, MarketplaceListing};
use crate::utils::url::url_hash;

/// Lookup capability against the reference marketplace.
#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    /// Look a listing up by product code (EAN/UPC family).
    async fn lookup_by_identifier(
        &self,
        code: &str,
    ) -> anyhow::Result<Option<MarketplaceListing>>;

    /// Search listings by title text, best candidates first.
    async fn lookup_by_title(&self, text: &str) -> anyhow::Result<Vec<MarketplaceListing>>;
}

/// Marketplace backed by an exported JSON listing dump.
///
/// Used for offline matching runs and tests; the live marketplace client
/// lives outside this crate.
pub struct FileMarketplace {
    listings: Vec<MarketplaceListing>,
    by_identifier: HashMap<String, usize>,
}

impl FileMarketplace {
    pub fn new(listings: Vec<MarketplaceListing>) -> Self {
        let by_identifier = listings
            .iter()
            .enumerate()
            .filter_map(|(idx, listing)| {
                listing
                    .identifier
                    .as_deref()
                    .and_then(gtin14)
                    .map(|code| (code, idx))
            })
            .collect();
        Self {
            listings,
            by_identifier,
        }
    }

    /// Load a listing dump from a JSON array file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let listings: Vec<MarketplaceListing> = serde_json::from_str(&raw)?;
        Ok(Self::new(listings))
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

#[async_trait]
impl MarketplaceClient for FileMarketplace {
    async fn lookup_by_identifier(
        &self,
        code: &str,
    ) -> anyhow::Result<Option<MarketplaceListing>> {
        let Some(normalized) = gtin14(code) else {
            return Ok(None);
        };
        Ok(self
            .by_identifier
            .get(&normalized)
            .map(|&idx| self.listings[idx].clone()))
    }

    async fn lookup_by_title(&self, text: &str) -> anyhow::Result<Vec<MarketplaceListing>> {
        use crate::matcher::similarity::title_similarity;

        let mut scored: Vec<(f64, &MarketplaceListing)> = self
            .listings
            .iter()
            .map(|listing| (title_similarity(text, &listing.title), listing))
            .filter(|(score, _)| *score > 0.3)
            .collect();
        scored.sort_by(|(a, _), (b, _)| b.total_cmp(a));
        Ok(scored.into_iter().take(10).map(|(_, l)| l.clone()).collect())
    }
}

/// Caching wrapper around any marketplace client.
///
/// Identifier lookups (including negative results) and title searches are
/// persisted with a write timestamp; entries older than the TTL read as
/// misses and fall through to the inner client.
pub struct CachedMarketplace<C> {
    inner: C,
    by_identifier: Store<Option<MarketplaceListing>>,
    by_title: Store<Vec<MarketplaceListing>>,
    ttl: Duration,
}

impl<C: MarketplaceClient> CachedMarketplace<C> {
    pub fn new(inner: C, cache_dir: &Path, ttl: Duration) -> Self {
        Self {
            inner,
            by_identifier: Store::new(cache_dir.join("marketplace_by_id")),
            by_title: Store::new(cache_dir.join("marketplace_by_title")),
            ttl,
        }
    }
}

#[async_trait]
impl<C: MarketplaceClient> MarketplaceClient for CachedMarketplace<C> {
    async fn lookup_by_identifier(
        &self,
        code: &str,
    ) -> anyhow::Result<Option<MarketplaceListing>> {
        let key = gtin14(code).unwrap_or_else(|| code.to_string());
        if let Some(cached) = self.by_identifier.get(&key, self.ttl) {
            debug!("Marketplace cache hit for identifier {}", key);
            return Ok(cached);
        }
        let result = self.inner.lookup_by_identifier(code).await?;
        let _ = self.by_identifier.put(&key, &result);
        Ok(result)
    }

    async fn lookup_by_title(&self, text: &str) -> anyhow::Result<Vec<MarketplaceListing>> {
        let key = url_hash(text);
        if let Some(cached) = self.by_title.get(&key, self.ttl) {
            debug!("Marketplace cache hit for title query");
            return Ok(cached);
        }
        let result = self.inner.lookup_by_title(text).await?;
        let _ = self.by_title.put(&key, &result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn listing(id: &str, title: &str, identifier: Option<&str>) -> MarketplaceListing {
        MarketplaceListing {
            marketplace_id: id.to_string(),
            title: title.to_string(),
            brand: None,
            identifier: identifier.map(|s| s.to_string()),
            price: Some(19.99),
            url: format!("https://marketplace.example.com/dp/{}", id),
        }
    }

    #[tokio::test]
    async fn test_file_marketplace_identifier_lookup() {
        let market = FileMarketplace::new(vec![
            listing("B001", "Knife Set", Some("4006381333931")),
            listing("B002", "Cutting Board", None),
        ]);

        let hit = market.lookup_by_identifier("4006381333931").await.unwrap();
        assert_eq!(hit.unwrap().marketplace_id, "B001");

        assert!(market.lookup_by_identifier("9999999999999").await.unwrap().is_none());
        // SKU-shaped codes are never looked up
        assert!(market.lookup_by_identifier("SKU-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_marketplace_title_lookup_ranks_best_first() {
        let market = FileMarketplace::new(vec![
            listing("B001", "Garden Hose 25m", None),
            listing("B002", "Kitchen Knife Set 5pc", None),
            listing("B003", "Knife Sharpener Steel", None),
        ]);

        let results = market.lookup_by_title("5pc Kitchen Knife Set").await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].marketplace_id, "B002");
    }

    struct CountingMarketplace {
        inner: FileMarketplace,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MarketplaceClient for CountingMarketplace {
        async fn lookup_by_identifier(
            &self,
            code: &str,
        ) -> anyhow::Result<Option<MarketplaceListing>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.lookup_by_identifier(code).await
        }

        async fn lookup_by_title(&self, text: &str) -> anyhow::Result<Vec<MarketplaceListing>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.lookup_by_title(text).await
        }
    }

    #[tokio::test]
    async fn test_cached_marketplace_avoids_repeat_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let market = CachedMarketplace::new(
            CountingMarketplace {
                inner: FileMarketplace::new(vec![listing(
                    "B001",
                    "Knife Set",
                    Some("4006381333931"),
                )]),
                calls: calls.clone(),
            },
            dir.path(),
            Duration::hours(24),
        );

        for _ in 0..3 {
            let hit = market.lookup_by_identifier("4006381333931").await.unwrap();
            assert!(hit.is_some());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Negative results are cached too
        for _ in 0..3 {
            assert!(market.lookup_by_identifier("99999999").await.unwrap().is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
