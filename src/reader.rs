//! Time-windowed telemetry reader
//!
//! Scans the date-partitioned layout one day at a time, so the cost of a
//! query is bounded by its window rather than by total history. Parsing is
//! tolerant: a blank line, an unparseable line, or a line without a usable
//! timestamp is skipped, never fatal. Each fresh iterator re-reads from disk,
//! since files may be appended between queries.

use crate::models::TelemetryEntry;
use crate::storage::TELEMETRY_FILENAME;
use crate::timestamp::TimestampParser;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// Lazy iterator over records with timestamps in the inclusive window
/// `[start, end]`, in file order within each day.
pub struct RecordIter {
    base_dir: PathBuf,
    current: Option<NaiveDate>,
    end_date: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: Option<usize>,
    yielded: usize,
    lines: Option<Lines<BufReader<File>>>,
}

/// Iterate telemetry records under `base_dir` within `[start, end]`,
/// stopping early after `limit` yielded records if one is given.
pub fn iter_telemetry_records(
    base_dir: impl Into<PathBuf>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: Option<usize>,
) -> RecordIter {
    RecordIter {
        base_dir: base_dir.into(),
        current: Some(start.date_naive()),
        end_date: end.date_naive(),
        start,
        end,
        limit,
        yielded: 0,
        lines: None,
    }
}

/// Records for the last `days` days ending now.
pub fn iter_last_n_days(base_dir: impl Into<PathBuf>, days: i64) -> RecordIter {
    let end = Utc::now();
    let start = end - Duration::days(days);
    iter_telemetry_records(base_dir, start, end, None)
}

impl RecordIter {
    fn parse_line(&self, line: &str) -> Option<TelemetryEntry> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let value: Value = serde_json::from_str(line).ok()?;
        let ts_raw = value.get("timestamp")?.as_str()?;
        let timestamp = TimestampParser::parse(ts_raw).ok()?;
        if timestamp < self.start || timestamp > self.end {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    fn open_day(base_dir: &Path, date: NaiveDate) -> Option<Lines<BufReader<File>>> {
        let path = base_dir
            .join(date.format("%Y-%m-%d").to_string())
            .join(TELEMETRY_FILENAME);
        let file = File::open(path).ok()?;
        Some(BufReader::new(file).lines())
    }
}

impl Iterator for RecordIter {
    type Item = TelemetryEntry;

    fn next(&mut self) -> Option<TelemetryEntry> {
        if let Some(limit) = self.limit {
            if self.yielded >= limit {
                return None;
            }
        }

        loop {
            if let Some(mut lines) = self.lines.take() {
                for line in lines.by_ref() {
                    let Ok(line) = line else { continue };
                    if let Some(entry) = self.parse_line(&line) {
                        self.lines = Some(lines);
                        self.yielded += 1;
                        return Some(entry);
                    }
                }
                // day exhausted, fall through to the next one
            }

            let date = self.current.filter(|date| *date <= self.end_date)?;
            self.current = date.succ_opt();
            self.lines = Self::open_day(&self.base_dir, date);
        }
    }
}
