//! Command implementations.

pub mod config_cmd;
pub mod crawl;
pub mod history_cmd;
pub mod match_cmd;
