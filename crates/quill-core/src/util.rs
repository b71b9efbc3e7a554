//! Shared utility functions used across multiple modules.

use chrono::{DateTime, Utc};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current time truncated to microseconds.
///
/// Every timestamp the store persists goes through this precision, so a value
/// read back from `SQLite` compares equal to the one that was written.
pub fn now() -> DateTime<Utc> {
    truncate_micros(Utc::now())
}

/// Drop sub-microsecond precision from a timestamp.
pub fn truncate_micros(value: DateTime<Utc>) -> DateTime<Utc> {
    from_micros(value.timestamp_micros()).unwrap_or(value)
}

/// Convert a stored microsecond count back into a UTC timestamp.
pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}
