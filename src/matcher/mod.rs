//! Confidence-scored reconciliation of supplier records against
//! marketplace candidates.
//!
//! Scoring accumulates weighted contributions from identifier equality,
//! brand similarity, and title similarity, then buckets the clamped score
//! into a tier. Medium-tier results may be escalated to a configured LLM
//! tie-breaker; high and low results never are.

pub mod similarity;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{gtin14, MarketplaceListing, MatchResult, MatchTier, SupplierProduct};
use similarity::{brand_in_title_similarity, title_similarity};

/// Scoring weights and thresholds.
///
/// The deltas are heuristics, not derived constants; they are configurable
/// with the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    /// Contribution for an exact identifier match (both sides comparable).
    #[serde(default = "default_identifier_match")]
    pub identifier_match: f64,
    /// Penalty when both sides carry comparable identifiers that differ.
    #[serde(default = "default_identifier_mismatch")]
    pub identifier_mismatch: f64,
    /// Contribution when brand similarity clears `brand_threshold`.
    #[serde(default = "default_brand")]
    pub brand: f64,
    #[serde(default = "default_brand_threshold")]
    pub brand_threshold: f64,
    /// Contribution when title similarity clears `title_strong_threshold`.
    #[serde(default = "default_title_strong")]
    pub title_strong: f64,
    /// Contribution when title similarity clears `title_weak_threshold`.
    #[serde(default = "default_title_weak")]
    pub title_weak: f64,
    /// Penalty when title similarity clears neither threshold.
    #[serde(default = "default_title_penalty")]
    pub title_penalty: f64,
    #[serde(default = "default_title_strong_threshold")]
    pub title_strong_threshold: f64,
    #[serde(default = "default_title_weak_threshold")]
    pub title_weak_threshold: f64,
    /// Score at or above which a result is `high`.
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    /// Score at or above which a result is `medium`.
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,
    /// Score floor applied when the tie-breaker confirms a match.
    #[serde(default = "default_promote_floor")]
    pub promote_floor: f64,
    /// Score ceiling applied when the tie-breaker rejects a match.
    #[serde(default = "default_demote_ceiling")]
    pub demote_ceiling: f64,
}

fn default_identifier_match() -> f64 {
    0.6
}
fn default_identifier_mismatch() -> f64 {
    -0.2
}
fn default_brand() -> f64 {
    0.25
}
fn default_brand_threshold() -> f64 {
    0.85
}
fn default_title_strong() -> f64 {
    0.15
}
fn default_title_weak() -> f64 {
    0.05
}
fn default_title_penalty() -> f64 {
    -0.10
}
fn default_title_strong_threshold() -> f64 {
    0.75
}
fn default_title_weak_threshold() -> f64 {
    0.50
}
fn default_high_threshold() -> f64 {
    0.75
}
fn default_medium_threshold() -> f64 {
    0.45
}
fn default_promote_floor() -> f64 {
    0.80
}
fn default_demote_ceiling() -> f64 {
    0.20
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            identifier_match: default_identifier_match(),
            identifier_mismatch: default_identifier_mismatch(),
            brand: default_brand(),
            brand_threshold: default_brand_threshold(),
            title_strong: default_title_strong(),
            title_weak: default_title_weak(),
            title_penalty: default_title_penalty(),
            title_strong_threshold: default_title_strong_threshold(),
            title_weak_threshold: default_title_weak_threshold(),
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            promote_floor: default_promote_floor(),
            demote_ceiling: default_demote_ceiling(),
        }
    }
}

/// Tie-breaker verdict for an ambiguous comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    Match,
    Mismatch,
    Uncertain,
}

/// Disambiguation capability for medium-confidence comparisons.
///
/// Implemented by the LLM analysis client; test code substitutes stubs.
#[async_trait]
pub trait TieBreaker: Send + Sync {
    async fn disambiguate(
        &self,
        supplier: &SupplierProduct,
        candidate: &MarketplaceListing,
    ) -> anyhow::Result<TieBreak>;
}

/// Scores supplier records against marketplace candidates.
#[derive(Debug, Clone, Default)]
pub struct ProductMatcher {
    weights: MatchWeights,
}

impl ProductMatcher {
    pub fn new(weights: MatchWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &MatchWeights {
        &self.weights
    }

    /// Score one comparison without any tie-breaking.
    pub fn score(
        &self,
        supplier: &SupplierProduct,
        candidate: &MarketplaceListing,
    ) -> MatchResult {
        let w = &self.weights;
        let mut score = 0.0f64;
        let mut reasons = Vec::new();

        // Identifier signal only when both sides carry a comparable code
        let supplier_gtin = supplier.identifier.as_deref().and_then(gtin14);
        let candidate_gtin = candidate.identifier.as_deref().and_then(gtin14);
        if let (Some(ours), Some(theirs)) = (&supplier_gtin, &candidate_gtin) {
            if ours == theirs {
                score += w.identifier_match;
                reasons.push("identifier match".to_string());
            } else {
                score += w.identifier_mismatch;
                reasons.push("identifier mismatch".to_string());
            }
        }

        if let Some(brand) = candidate.brand.as_deref() {
            let ratio = brand_in_title_similarity(brand, &supplier.title);
            if ratio >= w.brand_threshold {
                score += w.brand;
                reasons.push(format!("brand similarity {:.2}", ratio));
            }
        }

        let title_ratio = title_similarity(&supplier.title, &candidate.title);
        if title_ratio >= w.title_strong_threshold {
            score += w.title_strong;
            reasons.push(format!("title similarity {:.2} (strong)", title_ratio));
        } else if title_ratio >= w.title_weak_threshold {
            score += w.title_weak;
            reasons.push(format!("title similarity {:.2} (weak)", title_ratio));
        } else {
            score += w.title_penalty;
            reasons.push(format!("title similarity {:.2} (dissimilar)", title_ratio));
        }

        let score = score.clamp(0.0, 1.0);
        MatchResult {
            score,
            tier: self.tier_for(score),
            reasons,
        }
    }

    /// Score one comparison, escalating medium-tier results to the
    /// tie-breaker when one is configured. High and low tiers are final
    /// without any external call.
    pub async fn match_product(
        &self,
        supplier: &SupplierProduct,
        candidate: &MarketplaceListing,
        tie_breaker: Option<&dyn TieBreaker>,
    ) -> MatchResult {
        let mut result = self.score(supplier, candidate);

        if result.tier != MatchTier::Medium {
            return result;
        }
        let Some(breaker) = tie_breaker else {
            return result;
        };

        match breaker.disambiguate(supplier, candidate).await {
            Ok(TieBreak::Match) => {
                result.score = result.score.max(self.weights.promote_floor);
                result.tier = MatchTier::High;
                result.reasons.push("tie-breaker: match".to_string());
            }
            Ok(TieBreak::Mismatch) => {
                result.score = result.score.min(self.weights.demote_ceiling);
                result.tier = MatchTier::Low;
                result.reasons.push("tie-breaker: mismatch".to_string());
            }
            Ok(TieBreak::Uncertain) => {
                result.reasons.push("tie-breaker: uncertain".to_string());
            }
            Err(e) => {
                // A failed tie-break leaves the ambiguous result as-is
                debug!("Tie-breaker failed: {}", e);
                result.reasons.push("tie-breaker: unavailable".to_string());
            }
        }

        result
    }

    /// Score a supplier record against each candidate and return the best.
    pub fn best_candidate<'a>(
        &self,
        supplier: &SupplierProduct,
        candidates: &'a [MarketplaceListing],
    ) -> Option<(&'a MarketplaceListing, MatchResult)> {
        candidates
            .iter()
            .map(|c| (c, self.score(supplier, c)))
            .max_by(|(_, a), (_, b)| a.score.total_cmp(&b.score))
    }

    fn tier_for(&self, score: f64) -> MatchTier {
        if score >= self.weights.high_threshold {
            MatchTier::High
        } else if score >= self.weights.medium_threshold {
            MatchTier::Medium
        } else {
            MatchTier::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn supplier(title: &str, identifier: Option<&str>) -> SupplierProduct {
        SupplierProduct {
            title: title.to_string(),
            price: 24.99,
            currency: "EUR".to_string(),
            source_url: "https://shop.example.com/p/1".to_string(),
            identifier: identifier.map(|s| s.to_string()),
            image_url: None,
            source_category_url: "https://shop.example.com/c/1".to_string(),
            extracted_at: Utc::now(),
        }
    }

    fn candidate(
        title: &str,
        identifier: Option<&str>,
        brand: Option<&str>,
    ) -> MarketplaceListing {
        MarketplaceListing {
            marketplace_id: "B00TEST123".to_string(),
            title: title.to_string(),
            brand: brand.map(|s| s.to_string()),
            identifier: identifier.map(|s| s.to_string()),
            price: Some(39.99),
            url: "https://marketplace.example.com/dp/B00TEST123".to_string(),
        }
    }

    fn tier_rank(tier: MatchTier) -> u8 {
        match tier {
            MatchTier::Low => 0,
            MatchTier::Medium => 1,
            MatchTier::High => 2,
        }
    }

    #[test]
    fn test_identifier_and_title_match_is_high() {
        let matcher = ProductMatcher::default();
        let result = matcher.score(
            &supplier("Kitchen Knife Set 5pc", Some("4006381333931")),
            &candidate("5pc Kitchen Knife Set", Some("4006381333931"), None),
        );
        assert_eq!(result.tier, MatchTier::High);
        assert!(result.score >= 0.75);
        assert!(result.reasons.iter().any(|r| r == "identifier match"));
    }

    #[test]
    fn test_dissimilar_no_identifier_is_low() {
        let matcher = ProductMatcher::default();
        let result = matcher.score(
            &supplier("Blue Widget", None),
            &candidate("Red Gadget", None, None),
        );
        assert_eq!(result.tier, MatchTier::Low);
        assert!(result.score <= 0.2);
    }

    #[test]
    fn test_sku_identifiers_are_not_compared() {
        let matcher = ProductMatcher::default();
        // Opaque SKUs on both sides must neither reward nor penalize
        let result = matcher.score(
            &supplier("Kitchen Knife Set", Some("SKU-A1")),
            &candidate("Kitchen Knife Set", Some("SKU-B2"), None),
        );
        assert!(!result.reasons.iter().any(|r| r.contains("identifier")));
    }

    #[test]
    fn test_score_monotonic_in_identifier_signal() {
        let matcher = ProductMatcher::default();
        let without = matcher.score(
            &supplier("Kitchen Knife Set", None),
            &candidate("Kitchen Knife Set", None, None),
        );
        let with = matcher.score(
            &supplier("Kitchen Knife Set", Some("4006381333931")),
            &candidate("Kitchen Knife Set", Some("4006381333931"), None),
        );
        assert!(with.score >= without.score);
        assert!(tier_rank(with.tier) >= tier_rank(without.tier));
    }

    #[test]
    fn test_brand_contribution() {
        let matcher = ProductMatcher::default();
        let without = matcher.score(
            &supplier("Zwilling Chef Knife 20cm", None),
            &candidate("Chef Knife 20 cm", None, None),
        );
        let with = matcher.score(
            &supplier("Zwilling Chef Knife 20cm", None),
            &candidate("Chef Knife 20 cm", None, Some("Zwilling")),
        );
        assert!(with.score > without.score);
        assert!(with.reasons.iter().any(|r| r.starts_with("brand")));
    }

    struct PanickingBreaker;

    #[async_trait]
    impl TieBreaker for PanickingBreaker {
        async fn disambiguate(
            &self,
            _supplier: &SupplierProduct,
            _candidate: &MarketplaceListing,
        ) -> anyhow::Result<TieBreak> {
            panic!("tie-breaker must not run outside the medium band");
        }
    }

    #[tokio::test]
    async fn test_tie_breaker_not_invoked_for_high_or_low() {
        let matcher = ProductMatcher::default();
        let breaker = PanickingBreaker;

        let high = matcher
            .match_product(
                &supplier("Kitchen Knife Set", Some("4006381333931")),
                &candidate("Kitchen Knife Set", Some("4006381333931"), None),
                Some(&breaker),
            )
            .await;
        assert_eq!(high.tier, MatchTier::High);

        let low = matcher
            .match_product(
                &supplier("Blue Widget", None),
                &candidate("Red Gadget", None, None),
                Some(&breaker),
            )
            .await;
        assert_eq!(low.tier, MatchTier::Low);
    }

    struct FixedBreaker(TieBreak);

    #[async_trait]
    impl TieBreaker for FixedBreaker {
        async fn disambiguate(
            &self,
            _supplier: &SupplierProduct,
            _candidate: &MarketplaceListing,
        ) -> anyhow::Result<TieBreak> {
            Ok(self.0)
        }
    }

    fn medium_band_pair() -> (SupplierProduct, MarketplaceListing) {
        // Brand + strong title = 0.40 with a small lift from weights below
        (
            supplier("Zwilling Kitchen Knife Set 5pc", None),
            candidate("Zwilling Kitchen Knife Set", None, Some("Zwilling")),
        )
    }

    fn medium_weights() -> MatchWeights {
        // Title weight raised so brand+title lands in the medium band
        MatchWeights {
            title_strong: 0.25,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tie_breaker_promotes_medium_to_high() {
        let matcher = ProductMatcher::new(medium_weights());
        let (s, c) = medium_band_pair();
        assert_eq!(matcher.score(&s, &c).tier, MatchTier::Medium);

        let result = matcher
            .match_product(&s, &c, Some(&FixedBreaker(TieBreak::Match)))
            .await;
        assert_eq!(result.tier, MatchTier::High);
        assert!(result.score >= 0.80);
    }

    #[tokio::test]
    async fn test_tie_breaker_demotes_medium_to_low() {
        let matcher = ProductMatcher::new(medium_weights());
        let (s, c) = medium_band_pair();

        let result = matcher
            .match_product(&s, &c, Some(&FixedBreaker(TieBreak::Mismatch)))
            .await;
        assert_eq!(result.tier, MatchTier::Low);
        assert!(result.score <= 0.20);
    }

    #[tokio::test]
    async fn test_tie_breaker_uncertain_leaves_medium() {
        let matcher = ProductMatcher::new(medium_weights());
        let (s, c) = medium_band_pair();

        let result = matcher
            .match_product(&s, &c, Some(&FixedBreaker(TieBreak::Uncertain)))
            .await;
        assert_eq!(result.tier, MatchTier::Medium);
    }

    #[test]
    fn test_best_candidate_picks_highest_score() {
        let matcher = ProductMatcher::default();
        let s = supplier("Kitchen Knife Set 5pc", Some("4006381333931"));
        let candidates = vec![
            candidate("Garden Hose 25m", None, None),
            candidate("Kitchen Knife Set 5pc", Some("4006381333931"), None),
            candidate("Knife Sharpener", None, None),
        ];
        let (best, result) = matcher.best_candidate(&s, &candidates).unwrap();
        assert_eq!(best.title, "Kitchen Knife Set 5pc");
        assert_eq!(result.tier, MatchTier::High);
    }
}
