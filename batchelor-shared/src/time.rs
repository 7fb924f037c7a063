//! Timestamp helpers. Batchelor stores all timestamps as epoch milliseconds
//! (matching the `*_TS` integer columns in the original SQLite schema) but
//! renders them as RFC3339 on the wire and in CLI output.

use chrono::{DateTime, TimeZone, Utc};

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn millis_to_rfc3339(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

pub fn rfc3339_to_millis(input: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}
