#![forbid(unsafe_code)]

use chrono::{Local, NaiveDateTime, TimeZone};
use std::time::SystemTime;

/// Layouts `ps -o lstart=` is known to print, after whitespace runs are
/// collapsed (so `Jan  2` and `Jan 2` are the same input).
const LAYOUTS: &[&str] = &[
    "%a %b %d %H:%M:%S %Y",
    "%a %d %b %Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a process start time printed in local time.
///
/// Returns `None` when no layout fits; callers treat that as unknown.
pub fn parse_start_time(text: &str) -> Option<SystemTime> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return None;
    }
    let naive = LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(&normalized, layout).ok())?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(SystemTime::from)
}
