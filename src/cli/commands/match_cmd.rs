//! Match command implementation.

use std::path::{Path, PathBuf};

use console::style;
use serde::Serialize;

use crate::config::Settings;
use crate::llm::AnalysisClient;
use crate::marketplace::{CachedMarketplace, FileMarketplace, MarketplaceClient};
use crate::matcher::{ProductMatcher, TieBreaker};
use crate::models::{MarketplaceListing, MatchResult, MatchTier, SupplierProduct};
use crate::selectors::write_json_atomic;

/// One matched pair in the output report.
#[derive(Debug, Serialize)]
struct MatchRecord {
    supplier: SupplierProduct,
    candidate: MarketplaceListing,
    result: MatchResult,
}

/// Match supplier records against marketplace listings.
pub async fn cmd_match(
    settings: &Settings,
    products_path: &Path,
    listings_path: &Path,
    output: Option<PathBuf>,
    min_tier: &str,
) -> anyhow::Result<()> {
    let min_tier = parse_tier(min_tier)?;

    let raw = std::fs::read_to_string(products_path)?;
    let products: Vec<SupplierProduct> = serde_json::from_str(&raw)?;

    let marketplace = CachedMarketplace::new(
        FileMarketplace::load(listings_path)?,
        &settings.cache_dir(),
        settings.marketplace_ttl(),
    );
    let matcher = ProductMatcher::new(settings.matcher.clone());

    let tie_breaker: Option<AnalysisClient> = settings
        .llm
        .enabled
        .then(|| AnalysisClient::new(settings.llm.clone()));

    println!(
        "{} Matching {} supplier records",
        style("→").cyan(),
        products.len()
    );

    let mut records = Vec::new();
    let mut by_tier = [0u64; 3];
    for product in products {
        let candidates = lookup_candidates(&marketplace, &product).await?;
        let Some((candidate, _)) = matcher.best_candidate(&product, &candidates) else {
            continue;
        };
        let candidate = candidate.clone();

        let result = matcher
            .match_product(
                &product,
                &candidate,
                tie_breaker.as_ref().map(|c| c as &dyn TieBreaker),
            )
            .await;

        by_tier[tier_index(result.tier)] += 1;
        if tier_index(result.tier) <= tier_index(min_tier) {
            print_match(&product, &candidate, &result);
        }
        records.push(MatchRecord {
            supplier: product,
            candidate,
            result,
        });
    }

    println!(
        "{} {} high / {} medium / {} low",
        style("✓").green(),
        by_tier[0],
        by_tier[1],
        by_tier[2]
    );

    if let Some(out_path) = output {
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_json_atomic(&out_path, &records)?;
        println!("  results written to {}", out_path.display());
    }

    Ok(())
}

/// Identifier lookup first; title search only when it yields nothing.
async fn lookup_candidates<C: MarketplaceClient>(
    marketplace: &C,
    product: &SupplierProduct,
) -> anyhow::Result<Vec<MarketplaceListing>> {
    if let Some(code) = product.identifier.as_deref() {
        if let Some(hit) = marketplace.lookup_by_identifier(code).await? {
            return Ok(vec![hit]);
        }
    }
    marketplace.lookup_by_title(&product.title).await
}

fn print_match(product: &SupplierProduct, candidate: &MarketplaceListing, result: &MatchResult) {
    let tier = match result.tier {
        MatchTier::High => style("high").green(),
        MatchTier::Medium => style("medium").yellow(),
        MatchTier::Low => style("low").dim(),
    };
    println!(
        "  [{}] {:.2} {} -> {} ({})",
        tier,
        result.score,
        truncate(&product.title, 40),
        truncate(&candidate.title, 40),
        candidate.marketplace_id
    );
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn parse_tier(raw: &str) -> anyhow::Result<MatchTier> {
    match raw.to_lowercase().as_str() {
        "high" => Ok(MatchTier::High),
        "medium" => Ok(MatchTier::Medium),
        "low" => Ok(MatchTier::Low),
        other => anyhow::bail!("unknown tier {:?}, expected high, medium, or low", other),
    }
}

fn tier_index(tier: MatchTier) -> usize {
    match tier {
        MatchTier::High => 0,
        MatchTier::Medium => 1,
        MatchTier::Low => 2,
    }
}
