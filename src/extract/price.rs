//! Price string normalization.
//!
//! Supplier sites format prices every way imaginable: "€1.299,00",
//! "$1,299.00", "1299.00 EUR", "12,99". Parsing reduces all of them to a
//! canonical two-decimal amount with a sanity range check.

/// Currency assumed when the raw string carries no recognizable marker.
pub const DEFAULT_CURRENCY: &str = "EUR";

/// Reject parsed amounts outside this range as mis-parses.
const MIN_PLAUSIBLE: f64 = 0.001;
const MAX_PLAUSIBLE: f64 = 5_000_000.0;

/// Parse a raw price string into a canonical two-decimal amount.
///
/// Handles currency symbols, thousands separators, and locale decimal
/// commas. Returns `None` for unparseable strings and for amounts outside
/// the plausible range. Idempotent on its canonical output.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ',');
    if cleaned.is_empty() || !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');

    let decimal_sep = match (last_dot, last_comma) {
        // Both present: the later one is the decimal separator
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(pos), None) => infer_single_separator(cleaned, '.', pos),
        (None, Some(pos)) => infer_single_separator(cleaned, ',', pos),
        (None, None) => None,
    };

    let mut normalized = String::with_capacity(cleaned.len());
    for (i, c) in cleaned.char_indices() {
        if c.is_ascii_digit() {
            normalized.push(c);
        } else if Some(c) == decimal_sep && Some(i) == cleaned.rfind(c) {
            normalized.push('.');
        }
        // Other separators are thousands markers, dropped
    }

    let amount: f64 = normalized.parse().ok()?;
    let rounded = (amount * 100.0).round() / 100.0;

    if !(MIN_PLAUSIBLE..=MAX_PLAUSIBLE).contains(&rounded) {
        return None;
    }
    Some(rounded)
}

/// Decide whether a lone separator is decimal or thousands.
///
/// "12,99" reads as a decimal comma; "1,234" as a thousands marker;
/// "1.234.567" (separator seen more than once) is always thousands.
fn infer_single_separator(cleaned: &str, sep: char, last_pos: usize) -> Option<char> {
    if cleaned.matches(sep).count() > 1 {
        return None;
    }
    let tail_digits = cleaned[last_pos + 1..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if tail_digits == 3 {
        None
    } else {
        Some(sep)
    }
}

/// Detect an ISO currency code from symbols or codes in the raw string.
pub fn detect_currency(raw: &str) -> Option<&'static str> {
    let lower = raw.to_lowercase();
    if raw.contains('€') || lower.contains("eur") {
        Some("EUR")
    } else if raw.contains('£') || lower.contains("gbp") {
        Some("GBP")
    } else if raw.contains('$') || lower.contains("usd") {
        Some("USD")
    } else if raw.contains('¥') || lower.contains("jpy") {
        Some("JPY")
    } else if lower.contains("pln") || lower.contains("zł") {
        Some("PLN")
    } else {
        None
    }
}
