//! Fetched page representation and content validation.

use chrono::{DateTime, Utc};

/// A successfully fetched, validated HTML page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested.
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    /// HTTP status of the final response.
    pub status: u16,
    /// Page body.
    pub html: String,
    /// How many failed attempts preceded this success.
    pub retries: u32,
    pub fetched_at: DateTime<Utc>,
}

/// Whether a response body is plausibly a real HTML document.
///
/// Error pages from CDNs and bot walls are often tiny or not HTML at all;
/// accepting them would poison extraction downstream, so an implausible
/// body counts as a failed attempt.
pub fn looks_like_html(body: &str, min_bytes: usize) -> bool {
    if body.len() < min_bytes {
        return false;
    }
    let head: String = body
        .chars()
        .take(2048)
        .collect::<String>()
        .to_ascii_lowercase();
    head.contains("<!doctype html")
        || head.contains("<html")
        || head.contains("<body")
        || head.contains("<head")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_real_documents() {
        let body = format!(
            "<!DOCTYPE html><html><body>{}</body></html>",
            "x".repeat(600)
        );
        assert!(looks_like_html(&body, 512));
        let no_doctype = format!("<html><head></head><body>{}</body></html>", "x".repeat(600));
        assert!(looks_like_html(&no_doctype, 512));
    }

    #[test]
    fn test_rejects_tiny_bodies() {
        assert!(!looks_like_html("<html></html>", 512));
    }

    #[test]
    fn test_rejects_non_html() {
        let body = "a".repeat(4096);
        assert!(!looks_like_html(&body, 512));
        let json = format!("{{\"error\": \"denied\", \"pad\": \"{}\"}}", "x".repeat(600));
        assert!(!looks_like_html(&json, 512));
    }
}
