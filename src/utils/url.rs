//! URL normalization and hashing.
//!
//! Crawl deduplication compares URLs at three levels of strictness: the
//! exact string, a hash of the normalized form, and the bare
//! scheme+host+path. The normalized form is what makes query-reordered or
//! trailing-slash variants of the same page compare equal.

use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters that never change page identity.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "msclkid",
    "ref",
    "affiliate",
];

/// Normalize a URL to a canonical comparison form.
///
/// Lowercases scheme and host, drops the fragment and tracking parameters,
/// sorts remaining query parameters, and strips a trailing slash from
/// non-root paths. Unparseable input is returned trimmed but otherwise
/// unchanged so callers can still use it as an exact-match key.
pub fn normalize_url(raw: &str) -> String {
    let mut url = match Url::parse(raw.trim()) {
        Ok(u) => u,
        Err(_) => return raw.trim().to_string(),
    };

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let query = pairs
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    urlencoding::encode(k).into_owned()
                } else {
                    format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}

/// Hex SHA-256 of the normalized URL.
pub fn url_hash(raw: &str) -> String {
    let normalized = normalize_url(raw);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Reduce a URL to scheme+host+path, ignoring query and fragment.
///
/// The cheapest-to-compute but loosest dedup layer: pagination and filter
/// variants of one logical page collapse to the same base form.
pub fn base_form(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(u) => {
            let path = u.path().trim_end_matches('/');
            let path = if path.is_empty() { "/" } else { path };
            format!(
                "{}://{}{}",
                u.scheme(),
                u.host_str().unwrap_or_default(),
                path
            )
        }
        Err(_) => raw.trim().to_string(),
    }
}

/// Extract the host from a URL.
pub fn domain_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_ascii_lowercase()))
}

/// Resolve a possibly-relative href against a base URL.
pub fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    base.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sorts_query_params() {
        assert_eq!(
            normalize_url("https://shop.example.com/c/knives?page=2&sort=price"),
            normalize_url("https://shop.example.com/c/knives?sort=price&page=2")
        );
    }

    #[test]
    fn test_normalize_trailing_slash() {
        assert_eq!(
            normalize_url("https://shop.example.com/c/knives/"),
            normalize_url("https://shop.example.com/c/knives")
        );
        // Root path keeps its slash
        assert_eq!(
            normalize_url("https://shop.example.com/"),
            "https://shop.example.com/"
        );
    }

    #[test]
    fn test_normalize_strips_tracking_and_fragment() {
        assert_eq!(
            normalize_url("https://shop.example.com/p/1?utm_source=x&id=5#reviews"),
            "https://shop.example.com/p/1?id=5"
        );
    }

    #[test]
    fn test_hash_is_stable_across_variants() {
        assert_eq!(
            url_hash("https://shop.example.com/c?a=1&b=2"),
            url_hash("https://shop.example.com/c/?b=2&a=1")
        );
    }

    #[test]
    fn test_base_form_ignores_query() {
        assert_eq!(
            base_form("https://shop.example.com/c/knives?page=3"),
            "https://shop.example.com/c/knives"
        );
        assert_eq!(
            base_form("https://shop.example.com/c/knives/"),
            "https://shop.example.com/c/knives"
        );
    }

    #[test]
    fn test_resolve_href() {
        let base = Url::parse("https://shop.example.com/c/knives").unwrap();
        assert_eq!(
            resolve_href(&base, "/p/123").as_deref(),
            Some("https://shop.example.com/p/123")
        );
        assert_eq!(resolve_href(&base, "javascript:void(0)"), None);
        assert_eq!(resolve_href(&base, "#top"), None);
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(
            domain_of("https://Shop.Example.com/c"),
            Some("shop.example.com".to_string())
        );
        assert_eq!(domain_of("not a url"), None);
    }
}
