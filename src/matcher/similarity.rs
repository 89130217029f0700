//! Text normalization and sequence similarity for title/brand comparison.

/// Words carrying no product identity, dropped before comparison.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "for", "with", "in", "on", "to", "by",
];

/// Lowercase, strip punctuation, split, and drop stopwords.
pub fn normalize_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Sequence similarity ratio in [0, 1]: `2 * LCS / (len_a + len_b)` over
/// characters. 1.0 for identical strings, 0.0 when nothing aligns.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let lcs = lcs_len(&a, &b);
    (2.0 * lcs as f64) / (a.len() + b.len()) as f64
}

/// Title similarity: tokens are normalized and sorted before the sequence
/// comparison, so word order does not matter ("Kitchen Knife Set 5pc" and
/// "5pc Kitchen Knife Set" compare equal).
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let mut tokens_a = normalize_tokens(a);
    let mut tokens_b = normalize_tokens(b);
    tokens_a.sort();
    tokens_b.sort();
    sequence_ratio(&tokens_a.join(" "), &tokens_b.join(" "))
}

/// Best similarity between a brand string and any same-length window of
/// title tokens. A brand reported by the marketplace usually appears
/// verbatim somewhere in the supplier title; this finds it without
/// penalizing the rest of the title.
pub fn brand_in_title_similarity(brand: &str, title: &str) -> f64 {
    let brand_tokens = normalize_tokens(brand);
    let title_tokens = normalize_tokens(title);
    if brand_tokens.is_empty() || title_tokens.is_empty() {
        return 0.0;
    }
    let window = brand_tokens.len().min(title_tokens.len());
    let brand_joined = brand_tokens.join(" ");

    let mut best: f64 = 0.0;
    for chunk in title_tokens.windows(window) {
        let ratio = sequence_ratio(&brand_joined, &chunk.join(" "));
        if ratio > best {
            best = ratio;
        }
    }
    best
}

/// Longest common subsequence length, two-row dynamic programming.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
