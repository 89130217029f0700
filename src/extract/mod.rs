//! Rule-driven field extraction from parsed HTML.
//!
//! Each semantic field is extracted by trying its configured selector
//! rules in order and taking the first non-empty value. A field yielding
//! nothing is an expected outcome, not an error; fallback happens at the
//! discovery layer.

pub mod price;

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::trace;
use url::Url;

use crate::models::SupplierProduct;
use crate::selectors::{DomainConfig, Field, SelectorRule};
use price::{detect_currency, parse_price, DEFAULT_CURRENCY};

/// Apply one rule to a fragment: select the first matching node, read
/// text or the configured attribute, and run the optional post-process
/// capture. Returns `None` when anything along the way yields nothing.
fn apply_rule(fragment: ElementRef<'_>, field: Field, rule: &SelectorRule) -> Option<String> {
    if !rule.is_valid() {
        return None;
    }
    let selector = Selector::parse(&rule.selector).ok()?;
    let element = fragment.select(&selector).next()?;

    let attribute = rule
        .attribute
        .as_deref()
        .or_else(|| field.default_attribute());

    let raw = match attribute {
        Some(name) => element.value().attr(name)?.to_string(),
        None => collapse_whitespace(&element.text().collect::<Vec<_>>().join(" ")),
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match &rule.post_process {
        None => Some(raw.to_string()),
        Some(pattern) => {
            let re = Regex::new(pattern).ok()?;
            let captures = re.captures(raw)?;
            let value = captures.get(rule.capture_group)?.as_str().trim();
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        }
    }
}

/// Extract a field's value from a fragment: rules are tried in list
/// order and the first non-empty result wins, even if later rules would
/// also succeed.
pub fn extract_field(
    fragment: ElementRef<'_>,
    field: Field,
    rules: &[SelectorRule],
) -> Option<String> {
    rules.iter().find_map(|rule| apply_rule(fragment, field, rule))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts product records from listing pages using a domain's
/// selector configuration.
pub struct ListingExtractor {
    config: Arc<DomainConfig>,
}

impl ListingExtractor {
    pub fn new(config: Arc<DomainConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    /// Product container elements: the first container rule matching at
    /// least one element wins and contributes all of its matches.
    pub fn containers<'a>(&self, html: &'a Html) -> Vec<ElementRef<'a>> {
        for rule in self.config.rules(Field::ProductContainer) {
            let Ok(selector) = Selector::parse(&rule.selector) else {
                continue;
            };
            let matches: Vec<ElementRef<'a>> = html.select(&selector).collect();
            if !matches.is_empty() {
                return matches;
            }
        }
        Vec::new()
    }

    /// Number of product containers the current rules find.
    pub fn container_count(&self, html: &Html) -> usize {
        self.containers(html).len()
    }

    /// Extract all valid product records from a listing page.
    ///
    /// Records failing validation (missing title, unparseable price) are
    /// dropped individually; one broken card never fails the page.
    pub fn products(
        &self,
        html: &Html,
        page_url: &Url,
        category_url: &str,
    ) -> Vec<SupplierProduct> {
        let mut products = Vec::new();

        for container in self.containers(html) {
            match self.product_from_container(container, page_url, category_url) {
                Some(product) => products.push(product),
                None => trace!("Skipping container without valid title/price"),
            }
        }

        products
    }

    fn product_from_container(
        &self,
        container: ElementRef<'_>,
        page_url: &Url,
        category_url: &str,
    ) -> Option<SupplierProduct> {
        let title = extract_field(container, Field::Title, self.config.rules(Field::Title))?;

        let raw_price =
            extract_field(container, Field::Price, self.config.rules(Field::Price))?;
        let price = parse_price(&raw_price)?;
        let currency = detect_currency(&raw_price)
            .unwrap_or(DEFAULT_CURRENCY)
            .to_string();

        let source_url = extract_field(container, Field::Url, self.config.rules(Field::Url))
            .or_else(|| first_href(container))
            .and_then(|href| crate::utils::url::resolve_href(page_url, &href))
            .unwrap_or_else(|| page_url.to_string());

        let identifier =
            extract_field(container, Field::Identifier, self.config.rules(Field::Identifier))
                .map(|raw| raw.trim().to_string());

        let image_url = extract_field(container, Field::Image, self.config.rules(Field::Image))
            .or_else(|| first_image_src(container))
            .and_then(|src| crate::utils::url::resolve_href(page_url, &src));

        let product = SupplierProduct {
            title,
            price,
            currency,
            source_url,
            identifier,
            image_url,
            source_category_url: category_url.to_string(),
            extracted_at: Utc::now(),
        };

        product.is_valid().then_some(product)
    }
}

fn first_href(container: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("a[href]").ok()?;
    container
        .select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|s| s.to_string())
        .or_else(|| container.value().attr("href").map(|s| s.to_string()))
}

fn first_image_src(container: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("img[src]").ok()?;
    container
        .select(&selector)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|s| s.to_string())
}
