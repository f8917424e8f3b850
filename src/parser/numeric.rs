//! Tolerant parsing helpers shared by the line classifier and the format
//! table parser.
//!
//! Nothing here fails: malformed input yields zero or `None`.

use std::time::Duration;

/// Parse a percentage such as `"45.0"` or `"  6.2%"`. Returns `0.0` when the
/// text is not a number, and clamps to `0.0..=100.0`.
#[must_use]
pub fn parse_percent(text: &str) -> f64 {
    let trimmed = text.trim().trim_end_matches('%').trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => value.clamp(0.0, 100.0),
        _ => 0.0,
    }
}

/// Parse an unsigned integer, returning `0` on failure.
#[must_use]
pub fn parse_u64_or_zero(text: &str) -> u64 {
    text.trim().parse().unwrap_or(0)
}

/// Parse an unsigned 32-bit integer, returning `0` on failure.
#[must_use]
pub fn parse_u32_or_zero(text: &str) -> u32 {
    text.trim().parse().unwrap_or(0)
}

/// Parse an ETA such as `"00:05"`, `"1:02:03"` or `"12:32"`.
///
/// `"Unknown"`, `"--:--"` and anything else unparsable yield `None`.
#[must_use]
pub fn parse_eta(text: &str) -> Option<Duration> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut secs: u64 = 0;
    for part in parts {
        let value: u64 = part.parse().ok()?;
        secs = secs.checked_mul(60)?.checked_add(value)?;
    }
    Some(Duration::from_secs(secs))
}

/// Parse a human size like `"10.00MiB"`, `"1.26MiB"`, `"~ 343.72MiB"` or
/// `"500KiB"` into bytes. Returns `None` when no number is present.
#[must_use]
pub fn parse_size_bytes(text: &str) -> Option<u64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches(['~', '≈'])
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let split_at = cleaned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(cleaned.len());
    let (number, unit) = cleaned.split_at(split_at);
    let value: f64 = number.parse().ok()?;

    let multiplier: f64 = match unit.trim_end_matches("/s") {
        "" | "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" | "kB" => 1_000.0,
        "MB" => 1_000_000.0,
        "GB" => 1_000_000_000.0,
        "TB" => 1_000_000_000_000.0,
        _ => return None,
    };

    let bytes = value * multiplier;
    if bytes.is_finite() && bytes >= 0.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(bytes.round() as u64)
    } else {
        None
    }
}

/// Strip an approximate marker (`~` or `≈`) and surrounding whitespace from a
/// size column.
#[must_use]
pub fn strip_approx(text: &str) -> (&str, bool) {
    let trimmed = text.trim();
    match trimmed.strip_prefix(['~', '≈']) {
        Some(rest) => (rest.trim_start(), true),
        None => (trimmed, false),
    }
}
