//! Wall-clock helpers shared by native and WASM builds.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn to_datetime(millis: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis as i64).unwrap_or_default()
}

/// ISO-8601 timestamp with millisecond precision, e.g. `2026-10-19T08:30:00.123Z`.
pub fn iso_timestamp(millis: u64) -> String {
    to_datetime(millis).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Calendar date part only, e.g. `2026-10-19`.
pub fn iso_date(millis: u64) -> String {
    to_datetime(millis).format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_timestamp_format() {
        // 2024-01-02T03:04:05.678Z
        let millis = 1_704_164_645_678;
        assert_eq!(iso_timestamp(millis), "2024-01-02T03:04:05.678Z");
        assert_eq!(iso_date(millis), "2024-01-02");
    }
}
