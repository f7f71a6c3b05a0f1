use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical text form of a timestamp: RFC 3339, UTC, millisecond precision.
///
/// Fixed width, so lexical order of stored values equals chronological order.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Trims the value and drops it when empty.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
