//! Product records on both sides of a match, and the match outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A product record extracted from a supplier listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierProduct {
    /// Product title as shown on the listing.
    pub title: String,
    /// Price in canonical two-decimal form.
    pub price: f64,
    /// ISO currency code ("EUR", "USD", ...).
    pub currency: String,
    /// URL of the product page (or the listing anchor).
    pub source_url: String,
    /// Product code: an EAN/UPC-family digit string or an opaque SKU.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Main product image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Category listing page this record was extracted from.
    pub source_category_url: String,
    /// Timestamp of extraction.
    pub extracted_at: DateTime<Utc>,
}

impl SupplierProduct {
    /// A record is usable only with a positive price and a non-empty title.
    pub fn is_valid(&self) -> bool {
        self.price > 0.0 && !self.title.trim().is_empty()
    }

    /// Classify this record's identifier, if it has one.
    pub fn identifier_kind(&self) -> Option<IdentifierKind> {
        self.identifier.as_deref().map(identifier_kind)
    }
}

/// A candidate listing from the reference marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceListing {
    /// Stable marketplace identifier (ASIN-like).
    pub marketplace_id: String,
    /// Listing title.
    pub title: String,
    /// Brand as reported by the marketplace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Product code (EAN/UPC family) when the marketplace exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Current marketplace price, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Listing URL.
    pub url: String,
}

/// Kind of product code carried by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// 8-14 digit EAN/UPC/GTIN-family code, comparable across catalogs.
    Gtin,
    /// Anything else: an opaque supplier SKU, not comparable.
    Sku,
}

/// Classify a raw identifier string.
pub fn identifier_kind(raw: &str) -> IdentifierKind {
    let trimmed = raw.trim();
    let digits = trimmed.len();
    if (8..=14).contains(&digits) && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        IdentifierKind::Gtin
    } else {
        IdentifierKind::Sku
    }
}

/// Normalize a GTIN-family code to 14 digits for comparison.
///
/// EAN-13 and UPC-A forms of the same code differ only by leading zeros;
/// zero-padding to GTIN-14 makes them compare equal. Returns `None` for
/// anything that is not an 8-14 digit code.
pub fn gtin14(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    match identifier_kind(trimmed) {
        IdentifierKind::Gtin => Some(format!("{:0>14}", trimmed)),
        IdentifierKind::Sku => None,
    }
}

/// Discrete confidence bucket for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    High,
    Medium,
    Low,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::High => "high",
            MatchTier::Medium => "medium",
            MatchTier::Low => "low",
        }
    }
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scoring one supplier record against one marketplace candidate.
///
/// Derived and consumed immediately by the caller's accept/reject decision;
/// never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Confidence score in [0, 1].
    pub score: f64,
    /// Tier derived from the score (and possibly a tie-breaker).
    pub tier: MatchTier,
    /// Human-readable scoring contributions.
    pub reasons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(title: &str, price: f64) -> SupplierProduct {
        SupplierProduct {
            title: title.to_string(),
            price,
            currency: "EUR".to_string(),
            source_url: "https://shop.example.com/p/1".to_string(),
            identifier: None,
            image_url: None,
            source_category_url: "https://shop.example.com/c/1".to_string(),
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn test_validity_requires_price_and_title() {
        assert!(product("Kitchen Knife", 12.99).is_valid());
        assert!(!product("", 12.99).is_valid());
        assert!(!product("   ", 12.99).is_valid());
        assert!(!product("Kitchen Knife", 0.0).is_valid());
        assert!(!product("Kitchen Knife", -1.0).is_valid());
    }

    #[test]
    fn test_identifier_kind() {
        assert_eq!(identifier_kind("4006381333931"), IdentifierKind::Gtin);
        assert_eq!(identifier_kind("12345678"), IdentifierKind::Gtin);
        assert_eq!(identifier_kind("12345678901234"), IdentifierKind::Gtin);
        // Too short, too long, or non-numeric
        assert_eq!(identifier_kind("1234567"), IdentifierKind::Sku);
        assert_eq!(identifier_kind("123456789012345"), IdentifierKind::Sku);
        assert_eq!(identifier_kind("SKU-12345"), IdentifierKind::Sku);
    }

    #[test]
    fn test_gtin14_padding_unifies_variants() {
        // UPC-A and its EAN-13 zero-prefixed form are the same code
        assert_eq!(gtin14("036000291452"), gtin14("0036000291452"));
        assert_eq!(gtin14("SKU-1"), None);
    }
}
