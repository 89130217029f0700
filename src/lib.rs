//! pricetrawl - supplier catalog extraction and marketplace price matching.
//!
//! Crawls supplier e-commerce sites using per-domain selector configuration,
//! extracts structured product records, and reconciles them against a
//! reference marketplace with confidence-scored matching.

pub mod cache;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod discovery;
pub mod extract;
pub mod fetch;
pub mod llm;
pub mod marketplace;
pub mod matcher;
pub mod models;
pub mod selectors;
pub mod utils;
