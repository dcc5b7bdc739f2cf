//! Timestamp helpers. All stored timestamps are RFC 3339 strings.

use time::{Duration, OffsetDateTime};

/// Current UTC time as an RFC 3339 string with nanosecond precision.
///
/// Formatted manually so the call is infallible; nanoseconds keep
/// append-order timestamps strictly increasing in practice.
pub fn now_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

/// RFC 3339 string `days` from now, at nanosecond precision. Used for
/// lead-time deadlines.
pub fn rfc3339_in_days(days: i64) -> String {
    format_rfc3339(OffsetDateTime::now_utc() + Duration::days(days))
}

fn format_rfc3339(t: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:09}Z",
        t.year(),
        t.month() as u8,
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
        t.nanosecond()
    )
}
