//! Wall-clock helpers. Block timestamps are whole seconds since the UNIX epoch.

use chrono::{DateTime, Utc};

/// How far into the future a block timestamp may lie before it is rejected.
pub const MAX_CLOCK_SKEW_SECS: i64 = 3600;

/// Current time in seconds since the UNIX epoch.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Latest timestamp accepted at `now`.
pub fn latest_acceptable(now: i64) -> i64 {
    now.saturating_add(MAX_CLOCK_SKEW_SECS)
}

/// RFC 3339 rendering for display; falls back to the raw number when out of range.
pub fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
