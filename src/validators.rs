//! Input validators — phone normalization and the script gate.
//!
//! Pure functions, no I/O. The conversation engine calls these on every
//! free-text input.

use std::sync::LazyLock;

use regex::Regex;

/// The single accepted phone rendering: `+998 DD DDD DD DD`.
static CANONICAL_PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+998 \d{2} \d{3} \d{2} \d{2}$").expect("valid regex"));

/// Normalize a raw phone entry to `+998 XX XXX XX XX`.
///
/// Recognized shapes (by digit count after stripping non-digits):
/// - 12 digits starting `998` — `+998939999999`, `998939999999`
/// - 11 digits starting `8` (old trunk prefix) — `89399999999`
/// - exactly 9 digits (operator + subscriber) — `939999999`
///
/// Any other shape is returned as the trimmed original, which then fails the
/// canonical-format check downstream.
pub fn normalize_phone(raw: &str) -> String {
    let s = raw.trim();
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 12 && digits.starts_with("998") {
        return spaced(&digits);
    }

    if digits.len() == 11 && digits.starts_with('8') {
        return spaced(&format!("998{}", &digits[1..]));
    }

    if digits.len() == 9 {
        return spaced(&format!("998{digits}"));
    }

    s.to_string()
}

/// Render `998` + at least 9 more digits as `+998 XX XXX XX XX`.
/// Digits past the twelfth are dropped.
fn spaced(d: &str) -> String {
    format!(
        "+998 {} {} {} {}",
        &d[3..5],
        &d[5..8],
        &d[8..10],
        &d[10..12]
    )
}

/// True iff `s` is exactly the canonical phone format.
pub fn is_canonical_phone(s: &str) -> bool {
    CANONICAL_PHONE_RE.is_match(s)
}

/// True iff `s` contains no Cyrillic code point (U+0400..=U+04FF).
///
/// A coarse gate: it rejects the one disallowed script rather than
/// validating allowed ones. The empty string passes.
pub fn is_allowed_script(s: &str) -> bool {
    !s.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c))
}
