//! Data models for pricetrawl.

mod crawl;
mod product;

pub use crawl::{CrawlHistory, RunPhase, RunSummary, StageCounts};
pub use product::{
    gtin14, identifier_kind, IdentifierKind, MarketplaceListing, MatchResult, MatchTier,
    SupplierProduct,
};
