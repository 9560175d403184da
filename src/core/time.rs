//! UTC timestamp helpers.
//!
//! Every timestamp is stored as RFC 3339 with second precision and a `Z`
//! suffix so that text ordering in the store matches chronological ordering.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Format a timestamp the way the store persists it.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format an optional timestamp.
pub fn format_opt_ts(ts: Option<&DateTime<Utc>>) -> Option<String> {
    ts.map(format_ts)
}

/// Parse an RFC 3339 timestamp (any offset) into UTC.
///
/// Offset-less `YYYY-MM-DDTHH:MM:SS` values are taken as UTC. Returns `None`
/// for empty or unparseable input.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Parse an optional raw timestamp.
pub fn parse_opt_ts(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(parse_ts)
}

/// Calendar day (UTC) of a timestamp.
pub fn utc_day(ts: &DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

/// Hours from `start` to `end`, rounded to two decimals.
pub fn hours_between(start: &DateTime<Utc>, end: &DateTime<Utc>) -> f64 {
    let seconds = (*end - *start).num_seconds() as f64;
    round2(seconds / 3600.0)
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Query-string timestamp format used by the error tracker search syntax.
pub fn format_search_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_uses_z_suffix_and_seconds() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_ts(&ts), "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_parse_normalizes_offsets_to_utc() {
        let parsed = parse_ts("2024-01-01T12:00:00+02:00").unwrap();
        assert_eq!(format_ts(&parsed), "2024-01-01T10:00:00Z");
    }

    #[test]
    fn test_parse_accepts_fractional_and_naive() {
        assert!(parse_ts("2024-01-01T12:00:00.123456Z").is_some());
        assert_eq!(
            parse_ts("2024-01-01T12:00:00").map(|t| format_ts(&t)),
            Some("2024-01-01T12:00:00Z".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_ts("").is_none());
        assert!(parse_ts("yesterday").is_none());
        assert!(parse_opt_ts(None).is_none());
    }

    #[test]
    fn test_hours_between_rounds_to_two_decimals() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 1, 20, 0).unwrap();
        assert_eq!(hours_between(&start, &end), 1.33);
        assert_eq!(hours_between(&end, &start), -1.33);
    }

    #[test]
    fn test_utc_day_truncates() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        assert_eq!(utc_day(&ts), NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
    }
}
