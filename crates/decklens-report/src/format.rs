//! Number formatting for result display.

/// Seconds with two decimals: `12.345` → `"12.35s"`.
///
/// Non-finite input renders as `"-"`.
pub fn format_seconds(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "-".to_string();
    }
    format!("{:.2}s", seconds)
}

/// Integer with comma thousands separators: `1234567` → `"1,234,567"`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Percentage with one decimal: `41.666` → `"41.7%"`.
pub fn format_percent(percent: f64) -> String {
    if !percent.is_finite() {
        return "-".to_string();
    }
    format!("{:.1}%", percent)
}

/// Share of `count` in `total` as a percentage; zero when `total` is zero.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 * 100.0 / total as f64
}

/// Similarity score with three decimals.
pub fn format_similarity(similarity: f64) -> String {
    if !similarity.is_finite() {
        return "-".to_string();
    }
    format!("{:.3}", similarity)
}
