//! Next-page resolution for category listings.
//!
//! Tried in order: the domain's configured next-page rules, the domain's
//! URL pattern with a page-number substitution, generic rel=next and
//! "next"-text heuristics, and finally structural inference from a
//! numeric page segment already present in the current URL. A candidate
//! equal to the current page is never returned.

use scraper::{Html, Selector};
use url::Url;

use crate::extract::extract_field;
use crate::selectors::{DomainConfig, Field};
use crate::utils::url::{normalize_url, resolve_href};

/// Generic next-link selectors, tried after configured rules.
const GENERIC_NEXT_SELECTORS: &[&str] = &[
    "a[rel='next']",
    "link[rel='next']",
    ".pagination a.next",
    "a.next",
    ".pager-next a",
];

/// Anchor texts that mean "next page".
const NEXT_TEXTS: &[&str] = &["next", "next page", "›", "»", "→", ">", "weiter"];

/// Query parameters that carry a page number.
const PAGE_PARAMS: &[&str] = &["page", "p", "pg", "seite"];

/// Find the next page of a pagination chain.
pub fn find_next_page(
    html: &Html,
    current: &Url,
    config: &DomainConfig,
    current_page: u32,
) -> Option<String> {
    // (a) configured next-page rules
    let configured = extract_field(
        html.root_element(),
        Field::NextPage,
        config.rules(Field::NextPage),
    )
    .and_then(|href| resolve_href(current, &href));
    if let Some(url) = different(configured, current) {
        return Some(url);
    }

    // (b) configured URL pattern
    if let Some(url) = different(construct_next(current, config, current_page), current) {
        return Some(url);
    }

    // (c) generic selectors and link text
    if let Some(url) = different(generic_next(html, current), current) {
        return Some(url);
    }

    // (d) structural inference from the current URL
    different(structural_next(current), current)
}

/// Content-free next-page construction: the configured URL pattern, then
/// structural inference. Used to skip past already-visited pages without
/// re-fetching them.
pub fn construct_next_without_content(
    current: &Url,
    config: &DomainConfig,
    current_page: u32,
) -> Option<String> {
    different(construct_next(current, config, current_page), current)
        .or_else(|| different(structural_next(current), current))
}

fn construct_next(current: &Url, config: &DomainConfig, current_page: u32) -> Option<String> {
    let pattern = config.pagination_pattern.as_deref()?;
    let substituted = pattern.replace("{page}", &(current_page + 1).to_string());
    if substituted == pattern {
        // Pattern without a placeholder can never advance
        return None;
    }
    resolve_href(current, &substituted)
}

fn generic_next(html: &Html, current: &Url) -> Option<String> {
    for selector_str in GENERIC_NEXT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(href) = html
            .select(&selector)
            .find_map(|el| el.value().attr("href"))
        {
            if let Some(resolved) = resolve_href(current, href) {
                return Some(resolved);
            }
        }
    }

    // Text-based scan over all anchors
    let anchor = Selector::parse("a[href]").expect("static selector");
    for element in html.select(&anchor) {
        let text = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_lowercase();
        if NEXT_TEXTS.contains(&text.as_str()) {
            if let Some(href) = element.value().attr("href") {
                if let Some(resolved) = resolve_href(current, href) {
                    return Some(resolved);
                }
            }
        }
    }
    None
}

/// Increment a numeric page segment already present in the URL: a known
/// query parameter first, then a `/page/N` path segment.
fn structural_next(current: &Url) -> Option<String> {
    for param in PAGE_PARAMS {
        let value = current
            .query_pairs()
            .find(|(k, _)| k == param)
            .and_then(|(_, v)| v.parse::<u32>().ok());
        if let Some(page) = value {
            let mut next = current.clone();
            let pairs: Vec<(String, String)> = current
                .query_pairs()
                .map(|(k, v)| {
                    if k == *param {
                        (k.into_owned(), (page + 1).to_string())
                    } else {
                        (k.into_owned(), v.into_owned())
                    }
                })
                .collect();
            let query = pairs
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            next.set_query(Some(&query));
            return Some(next.to_string());
        }
    }

    let path = current.path();
    if let Some(idx) = path.find("/page/") {
        let tail = &path[idx + "/page/".len()..];
        let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(page) = digits.parse::<u32>() {
            let rest = &tail[digits.len()..];
            let new_path = format!("{}/page/{}{}", &path[..idx], page + 1, rest);
            let mut next = current.clone();
            next.set_path(&new_path);
            return Some(next.to_string());
        }
    }
    None
}

/// A candidate counts only when it is not the current page.
fn different(candidate: Option<String>, current: &Url) -> Option<String> {
    candidate.filter(|c| normalize_url(c) != normalize_url(current.as_str()))
}
