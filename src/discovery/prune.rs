//! Markup noise pruning for analysis requests.
//!
//! Raw listing pages are dominated by scripts, styles, and navigation
//! bloat that the analysis service does not need and that burns its
//! context budget. Pruning strips that noise and bounds the excerpt size.

use regex::Regex;
use std::sync::OnceLock;

fn noise_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?is)<script\b.*?</script>",
            r"(?is)<style\b.*?</style>",
            r"(?is)<noscript\b.*?</noscript>",
            r"(?is)<svg\b.*?</svg>",
            r"(?is)<iframe\b.*?</iframe>",
            r"(?is)<head\b.*?</head>",
            r"(?s)<!--.*?-->",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Strip noise elements and collapse whitespace, then truncate to
/// `max_bytes` at a character boundary.
pub fn prune_markup(html: &str, max_bytes: usize) -> String {
    let mut pruned = html.to_string();
    for pattern in noise_patterns() {
        pruned = pattern.replace_all(&pruned, " ").into_owned();
    }

    let collapsed = pruned.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.len() <= max_bytes {
        return collapsed;
    }
    let mut end = max_bytes;
    while end > 0 && !collapsed.is_char_boundary(end) {
        end -= 1;
    }
    collapsed[..end].to_string()
}
