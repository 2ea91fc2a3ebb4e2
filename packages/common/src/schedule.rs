//! Daily display-window evaluation for banners.
//!
//! A banner may carry an optional recurring window (`HH:MM` wall-clock bounds,
//! no date, no timezone). The window is evaluated against whichever clock runs
//! the check; the embed script carries a client-side mirror of these rules and
//! the two must stay behaviorally identical.

use chrono::{NaiveTime, Timelike};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid time '{0}': expected HH:MM")]
    InvalidTime(String),
}

/// Parse a `HH:MM` wall-clock string (two-digit fields, `00:00`..=`23:59`).
pub fn parse_hhmm(s: &str) -> Result<NaiveTime, ScheduleError> {
    let s = s.trim();
    if s.len() != 5 || s.as_bytes()[2] != b':' {
        return Err(ScheduleError::InvalidTime(s.to_string()));
    }
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| ScheduleError::InvalidTime(s.to_string()))
}

/// Render a wall-clock time back to `HH:MM`.
pub fn format_hhmm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Whether `now` falls inside the optional daily window.
///
/// No restriction when either bound is absent. When `start > end` the window
/// crosses midnight: `22:00`-`02:00` covers `23:30` and `01:00` but not
/// `12:00`. Bounds are inclusive on both ends.
pub fn within_window(start: Option<NaiveTime>, end: Option<NaiveTime>, now: NaiveTime) -> bool {
    let (Some(start), Some(end)) = (start, end) else {
        return true;
    };
    let (start, end, now) = (minute_of_day(start), minute_of_day(end), minute_of_day(now));
    if start <= end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    }
}
