//! User agent resolution.

/// Default identifying user agent.
pub const USER_AGENT: &str = concat!("pricetrawl/", env!("CARGO_PKG_VERSION"));

/// Real browser user agents for sites that reject obvious bots.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
];

/// Resolve the user agent from configuration:
/// - `None`: the default pricetrawl user agent
/// - `Some("impersonate")`: a randomly selected real browser user agent
/// - anything else: used verbatim
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some("impersonate") => {
            let idx = fastrand::usize(..IMPERSONATE_USER_AGENTS.len());
            IMPERSONATE_USER_AGENTS[idx].to_string()
        }
        Some(custom) => custom.to_string(),
    }
}
