//! Analysis service client for selector discovery and match tie-breaking.
//!
//! Talks to an Ollama-compatible API. Responses are treated as untrusted:
//! malformed or non-conforming output is a soft failure that callers
//! recover from with heuristics, never a fatal error.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::matcher::{TieBreak, TieBreaker};
use crate::models::{MarketplaceListing, SupplierProduct};

/// Analysis service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether analysis calls are made at all.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Multimodal model used when a screenshot accompanies the markup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on markup excerpt size sent for analysis.
    #[serde(default = "default_max_markup_chars")]
    pub max_markup_chars: usize,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.1".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_max_markup_chars() -> usize {
    30_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            model: default_model(),
            vision_model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_markup_chars: default_max_markup_chars(),
        }
    }
}

/// Selector proposal returned by the analysis service. Every field is
/// optional; the discovery layer validates each one live before use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectorProposal {
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// Errors from the analysis service.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("analysis service is disabled")]
    Disabled,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

/// Client for the analysis service.
pub struct AnalysisClient {
    config: LlmConfig,
    client: Client,
}

impl AnalysisClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // slow local models
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the analysis service is reachable.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/api/tags", self.config.endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Ask the service to propose selectors for a listing page.
    ///
    /// `markup` should already be noise-pruned; it is truncated to the
    /// configured bound here. A screenshot, when provided, is attached
    /// base64-encoded and routed to the vision model.
    pub async fn propose_selectors(
        &self,
        markup: &str,
        screenshot: Option<&[u8]>,
    ) -> Result<SelectorProposal, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let excerpt = truncate_utf8(markup, self.config.max_markup_chars);
        let prompt = format!(
            r#"You are analyzing an e-commerce category listing page to find CSS selectors for product data.

Respond with ONLY a JSON object with these keys (string values, null when not identifiable):
- "container": selector matching each repeated product card element
- "title": selector for the product title, relative to the container
- "price": selector for the product price, relative to the container
- "url": selector for the product link, relative to the container
- "image": selector for the product image, relative to the container
- "identifier": selector for an EAN/UPC/SKU code, relative to the container
- "next_page": selector for the next-page pagination link, relative to the document

Selectors must be plain CSS (no XPath, no jQuery extensions).

HTML:
{excerpt}"#
        );

        let images = screenshot.map(|bytes| {
            vec![base64::engine::general_purpose::STANDARD.encode(bytes)]
        });
        let model = if images.is_some() {
            self.config
                .vision_model
                .clone()
                .unwrap_or_else(|| self.config.model.clone())
        } else {
            self.config.model.clone()
        };

        debug!("Requesting selector proposal ({} chars of markup)", excerpt.len());
        let response = self.generate(&model, &prompt, images, true).await?;

        let json = extract_json_object(&response)
            .ok_or_else(|| LlmError::Parse("no JSON object in response".to_string()))?;
        serde_json::from_str(json).map_err(|e| LlmError::Parse(e.to_string()))
    }

    /// Single yes/no/uncertain classification for an ambiguous comparison.
    pub async fn classify_match(
        &self,
        supplier: &SupplierProduct,
        candidate: &MarketplaceListing,
    ) -> Result<TieBreak, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let prompt = format!(
            r#"Are these two listings the same physical product?

Supplier listing:
- title: {}
- price: {:.2} {}
- code: {}

Marketplace listing:
- title: {}
- brand: {}
- code: {}

Answer with exactly one word: "match", "mismatch", or "uncertain"."#,
            supplier.title,
            supplier.price,
            supplier.currency,
            supplier.identifier.as_deref().unwrap_or("unknown"),
            candidate.title,
            candidate.brand.as_deref().unwrap_or("unknown"),
            candidate.identifier.as_deref().unwrap_or("unknown"),
        );

        let response = self.generate(&self.config.model, &prompt, None, false).await?;
        Ok(parse_tie_break(&response))
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        images: Option<Vec<String>>,
        json_format: bool,
    ) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            format: json_format.then(|| "json".to_string()),
            images,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl TieBreaker for AnalysisClient {
    async fn disambiguate(
        &self,
        supplier: &SupplierProduct,
        candidate: &MarketplaceListing,
    ) -> anyhow::Result<TieBreak> {
        Ok(self.classify_match(supplier, candidate).await?)
    }
}

/// Map a free-text verdict onto the tie-break enum. Anything that is not
/// clearly a verdict reads as uncertain.
fn parse_tie_break(response: &str) -> TieBreak {
    let normalized = response.trim().to_lowercase();
    if normalized.contains("mismatch") || normalized.starts_with("no") {
        TieBreak::Mismatch
    } else if normalized.contains("match") || normalized.starts_with("yes") {
        TieBreak::Match
    } else {
        TieBreak::Uncertain
    }
}

/// Extract the first balanced JSON object from model output, tolerating
/// prose or code fences around it.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Truncate to a char boundary at or before `max_chars` bytes.
fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tie_break() {
        assert_eq!(parse_tie_break("match"), TieBreak::Match);
        assert_eq!(parse_tie_break("  Match.\n"), TieBreak::Match);
        assert_eq!(parse_tie_break("mismatch"), TieBreak::Mismatch);
        assert_eq!(parse_tie_break("no, different products"), TieBreak::Mismatch);
        assert_eq!(parse_tie_break("uncertain"), TieBreak::Uncertain);
        assert_eq!(parse_tie_break("I cannot tell"), TieBreak::Uncertain);
        assert_eq!(parse_tie_break(""), TieBreak::Uncertain);
    }

    #[test]
    fn test_extract_json_object_tolerates_prose() {
        let text = r#"Here are the selectors:
```json
{"container": ".product", "title": "h3", "price": null}
```
Hope this helps!"#;
        let json = extract_json_object(text).unwrap();
        let proposal: SelectorProposal = serde_json::from_str(json).unwrap();
        assert_eq!(proposal.container.as_deref(), Some(".product"));
        assert_eq!(proposal.title.as_deref(), Some("h3"));
        assert_eq!(proposal.price, None);
    }

    #[test]
    fn test_extract_json_object_handles_nested_braces_in_strings() {
        let text = r#"{"container": "div[data-x='{a}']", "title": "h2"}"#;
        let json = extract_json_object(text).unwrap();
        assert_eq!(json, text);
    }

    #[test]
    fn test_extract_json_object_none_without_json() {
        assert!(extract_json_object("no selectors here").is_none());
    }

    #[test]
    fn test_truncate_utf8_respects_boundaries() {
        let text = "püré".repeat(100);
        let truncated = truncate_utf8(&text, 7);
        assert!(truncated.len() <= 7);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn test_disabled_client_refuses_calls() {
        let client = AnalysisClient::new(LlmConfig::default());
        assert!(!client.config().enabled);
        let result =
            tokio::runtime::Runtime::new()
                .unwrap()
                .block_on(client.propose_selectors("<html></html>", None));
        assert!(matches!(result, Err(LlmError::Disabled)));
    }
}
