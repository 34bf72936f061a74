use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Unix timestamps at or above this are taken to be milliseconds.
const MILLIS_CUTOFF: i64 = 100_000_000_000;

/// Normalize a timestamp field to an RFC3339 string.
///
/// String values are validated and kept verbatim; integer values are read as
/// unix seconds or milliseconds. Returns `None` when the value is present but
/// not a parseable timestamp.
pub fn parse_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339)
            .ok()
            .map(|_| s.clone()),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            let secs = if raw.abs() >= MILLIS_CUTOFF {
                raw / 1000
            } else {
                raw
            };
            from_unix_seconds(secs)
        }
        _ => None,
    }
}

pub fn from_unix_seconds(secs: i64) -> Option<String> {
    let dt = OffsetDateTime::from_unix_timestamp(secs).ok()?;
    dt.format(&Rfc3339).ok()
}

/// Arrival-order fallback used when a missing timestamp is defaulted rather
/// than rejected: epoch plus the record's line number, in seconds, so file
/// order survives into the canonical timestamps.
pub fn arrival_order_timestamp(line_number: u64) -> String {
    from_unix_seconds(line_number as i64).unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}
