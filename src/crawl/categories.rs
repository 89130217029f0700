//! Category link discovery from homepage and navigation regions.
//!
//! Every anchor on the page is a candidate; an allow/deny keyword and
//! pattern test filters out non-product paths (cart, login, static
//! assets), and the remainder is ranked so likely category listings come
//! first.

use scraper::{Html, Selector};
use url::Url;

use crate::utils::url::{normalize_url, resolve_href};

/// Path/label fragments that disqualify a link outright.
const DENY_KEYWORDS: &[&str] = &[
    "cart",
    "checkout",
    "login",
    "signin",
    "sign-in",
    "register",
    "account",
    "wishlist",
    "compare",
    "privacy",
    "terms",
    "imprint",
    "impressum",
    "contact",
    "about",
    "help",
    "faq",
    "blog",
    "news",
    "press",
    "jobs",
    "careers",
    "returns",
    "shipping",
    "newsletter",
];

/// File extensions that are never category pages.
const DENY_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".ico", ".css", ".js", ".pdf", ".zip",
    ".xml", ".txt",
];

/// Path fragments that make a link look like a category listing.
const ALLOW_KEYWORDS: &[&str] = &[
    "category",
    "categories",
    "collection",
    "collections",
    "shop",
    "catalog",
    "products",
    "/c/",
    "dept",
];

/// A ranked category candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCandidate {
    pub url: String,
    pub label: String,
    pub score: i32,
}

/// Scan a page for category candidates: same-host links surviving the
/// deny filter, ranked by allow-keyword and navigation-context signals.
pub fn discover_categories(html: &Html, base: &Url) -> Vec<CategoryCandidate> {
    let anchor = Selector::parse("a[href]").expect("static selector");
    let base_host = base.host_str().unwrap_or_default().to_ascii_lowercase();

    let mut best: std::collections::HashMap<String, CategoryCandidate> =
        std::collections::HashMap::new();

    for element in html.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_href(base, href) else {
            continue;
        };
        let Ok(parsed) = Url::parse(&resolved) else {
            continue;
        };
        if parsed.host_str().unwrap_or_default().to_ascii_lowercase() != base_host {
            continue;
        }

        let path = parsed.path().to_ascii_lowercase();
        let label = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let label_lower = label.to_ascii_lowercase();

        if path == "/" || path.is_empty() {
            continue;
        }
        if DENY_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            continue;
        }
        if DENY_KEYWORDS
            .iter()
            .any(|kw| path.contains(kw) || label_lower == *kw)
        {
            continue;
        }

        let mut score = 0;
        if ALLOW_KEYWORDS.iter().any(|kw| path.contains(kw)) {
            score += 2;
        }
        if in_navigation_context(element) {
            score += 1;
        }
        if (3..=48).contains(&label.len()) {
            score += 1;
        }

        let key = normalize_url(&resolved);
        let candidate = CategoryCandidate {
            url: resolved,
            label,
            score,
        };
        best.entry(key)
            .and_modify(|existing| {
                if candidate.score > existing.score {
                    *existing = candidate.clone();
                }
            })
            .or_insert(candidate);
    }

    let mut candidates: Vec<CategoryCandidate> = best.into_values().collect();
    candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.url.cmp(&b.url)));
    candidates
}

/// Whether an anchor sits inside a nav-like region.
fn in_navigation_context(element: scraper::ElementRef<'_>) -> bool {
    for ancestor in element.ancestors() {
        if let Some(el) = ancestor.value().as_element() {
            if matches!(el.name(), "nav" | "header" | "aside") {
                return true;
            }
            if el
                .attr("class")
                .is_some_and(|c| c.contains("nav") || c.contains("menu"))
            {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOMEPAGE: &str = r#"
        <html><body>
        <nav>
            <a href="/c/kitchen">Kitchen</a>
            <a href="/c/garden">Garden</a>
            <a href="/login">Login</a>
            <a href="/cart">Cart</a>
        </nav>
        <main>
            <a href="/collections/sale">Sale</a>
            <a href="/about">About us</a>
            <a href="/logo.png">Logo</a>
            <a href="https://other.example.net/c/external">External</a>
            <a href="/c/kitchen">Kitchen again</a>
        </main>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse("https://shop.example.com/").unwrap()
    }

    #[test]
    fn test_denies_non_product_paths() {
        let html = Html::parse_document(HOMEPAGE);
        let candidates = discover_categories(&html, &base());
        let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();

        assert!(!urls.iter().any(|u| u.contains("login")));
        assert!(!urls.iter().any(|u| u.contains("cart")));
        assert!(!urls.iter().any(|u| u.contains("about")));
        assert!(!urls.iter().any(|u| u.contains("logo.png")));
        assert!(!urls.iter().any(|u| u.contains("other.example.net")));
    }

    #[test]
    fn test_ranks_nav_category_links_first() {
        let html = Html::parse_document(HOMEPAGE);
        let candidates = discover_categories(&html, &base());

        assert!(candidates.len() >= 3);
        // Nav links with category-like paths outrank body links
        assert!(candidates[0].url.contains("/c/"));
        assert!(candidates[0].score >= candidates.last().unwrap().score);
    }

    #[test]
    fn test_deduplicates_repeated_links() {
        let html = Html::parse_document(HOMEPAGE);
        let candidates = discover_categories(&html, &base());
        let kitchen_count = candidates
            .iter()
            .filter(|c| c.url.ends_with("/c/kitchen"))
            .count();
        assert_eq!(kitchen_count, 1);
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        let html = Html::parse_document("<html><body></body></html>");
        assert!(discover_categories(&html, &base()).is_empty());
    }
}
