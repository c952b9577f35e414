//! Formatting helpers for CLI output.

use chrono::Duration;

/// Format a number with thousands separators (commas).
///
/// # Examples
/// ```
/// use intelsync::utils::format_count;
/// assert_eq!(format_count(999), "999");
/// assert_eq!(format_count(1234567), "1,234,567");
/// ```
pub fn format_count(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Coarse age of a timestamp, e.g. "42s", "15m", "3h", "2d".
pub fn format_age(age: Duration) -> String {
    // Clock skew can make a fresh cursor look slightly ahead
    let secs = age.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}
