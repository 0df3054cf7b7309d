use std::cmp::Reverse;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse the date forms public-health feeds actually publish.
/// Returns None if nothing matches.
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = super::clean_str(s);
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Stable newest-first sort. Rows whose date cell is missing, empty or
/// unparsable key to `NaiveDateTime::MIN` and end up last.
pub fn sort_rows_by_date(rows: &mut [Vec<String>], column: usize) {
    let mut unparsable = 0usize;
    rows.sort_by_cached_key(|row| {
        let key = row.get(column).and_then(|cell| {
            let parsed = parse_date(cell);
            if parsed.is_none() && !cell.trim().is_empty() {
                debug!(cell = %cell, "unparsable date cell");
                unparsable += 1;
            }
            parsed
        });
        Reverse(key.unwrap_or(NaiveDateTime::MIN))
    });
    if unparsable > 0 {
        warn!(unparsable, column, "date cells could not be parsed; sorted as oldest");
    }
}
