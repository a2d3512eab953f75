//! Timestamp utilities

use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp the way it is stored in SQLite text columns
pub fn to_db_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a stored RFC 3339 timestamp back to UTC
pub fn parse_db_string(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Parse an optional stored timestamp
pub fn parse_optional_db_string(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|s| parse_db_string(column, &s)).transpose()
}

/// Fractional hours elapsed between `earlier` and `later`
pub fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 3_600_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_db_string_roundtrip_preserves_micros() {
        let ts = Utc.with_ymd_and_hms(2025, 12, 6, 18, 41, 23).unwrap()
            + Duration::microseconds(234_567);
        let stored = to_db_string(&ts);
        let parsed = parse_db_string("created_at", &stored).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_db_string("created_at", "yesterday").unwrap_err();
        assert!(err.to_string().contains("created_at"));
    }

    #[test]
    fn test_optional_none_stays_none() {
        assert!(parse_optional_db_string("posted_at", None).unwrap().is_none());
    }

    #[test]
    fn test_hours_between() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(hours_between(start, start + Duration::hours(24)), 24.0);
        assert_eq!(hours_between(start, start + Duration::minutes(90)), 1.5);
        assert!(hours_between(start + Duration::hours(1), start) < 0.0);
    }
}
