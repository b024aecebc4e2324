use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Parses the timestamp formats that show up in telemetry lines: `Z` suffix,
/// explicit offsets, and naive datetimes assumed to be UTC.
pub struct TimestampParser;

impl TimestampParser {
    pub fn parse(timestamp_str: &str) -> Result<DateTime<Utc>> {
        let timestamp = if timestamp_str.ends_with('Z') {
            timestamp_str.replace('Z', "+00:00")
        } else {
            timestamp_str.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&timestamp) {
            return Ok(dt.with_timezone(&Utc));
        }

        // Naive datetime, assume UTC
        if let Ok(naive) = NaiveDateTime::parse_from_str(&timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }

        anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_z_suffix() {
        let parsed = TimestampParser::parse("2026-08-01T12:00:00.000Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-08-01T12:00:00+00:00");
    }

    #[test]
    fn parses_explicit_offset() {
        let parsed = TimestampParser::parse("2026-08-01T12:00:00.000+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-08-01T10:00:00+00:00");
    }

    #[test]
    fn parses_naive_as_utc() {
        assert!(TimestampParser::parse("2026-08-01T12:00:00.000").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(TimestampParser::parse("not a timestamp").is_err());
    }
}
