//! Timestamp normalization.
//!
//! Inbound frames carry timestamps either as integer seconds-since-epoch or
//! as ISO-8601 strings, depending on channel, and some channels omit `ts`
//! entirely. Everything internal is microseconds since the epoch as `i64`.

use chrono::{DateTime, Utc};
use exchange_client::ws::models::RawTimestamp;

/// Normalize a wire timestamp to microseconds since the Unix epoch, falling
/// back to `received_at` (already in microseconds) when `raw` is absent or
/// fails to parse.
pub fn normalize_ts(raw: &Option<RawTimestamp>, received_at: i64) -> i64 {
    match raw {
        None => received_at,
        Some(RawTimestamp::Seconds(seconds)) => seconds.saturating_mul(1_000_000),
        Some(RawTimestamp::Iso8601(text)) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc).timestamp_micros())
            .unwrap_or(received_at),
    }
}

/// Whether a normalized timestamp is acceptable. `0` is a valid epoch
/// timestamp; negative values can only come from a malformed wire value and
/// are never valid, so callers must drop the row rather than store it.
pub fn is_valid_ts(ts: i64) -> bool {
    ts >= 0
}
