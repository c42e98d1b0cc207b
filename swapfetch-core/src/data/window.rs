//! Daily time windows.
//!
//! A run over `N` days starting at `D` is split into `N` half-open windows
//! `[D + i, D + i + 1)`, each anchored at UTC midnight. The window's start
//! date is its identity: it names the output file and decides whether the
//! day was already fetched.

use super::provider::DataError;
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::fmt;

/// A single-day `[start, end)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// The window covering `date` from midnight to the next midnight.
    pub fn for_day(date: NaiveDate) -> Option<Self> {
        let next = date.succ_opt()?;
        Some(Self {
            start: date.and_time(NaiveTime::MIN),
            end: next.and_time(NaiveTime::MIN),
        })
    }

    /// Calendar date the window starts on.
    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    /// Window start as UNIX seconds (UTC).
    pub fn start_timestamp(&self) -> i64 {
        self.start.and_utc().timestamp()
    }

    /// Window end as UNIX seconds (UTC).
    pub fn end_timestamp(&self) -> i64 {
        self.end.and_utc().timestamp()
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.date(), self.end.date())
    }
}

/// Parse a `YYYY-MM-DD` start date.
pub fn parse_start_date(s: &str) -> Result<NaiveDate, DataError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| DataError::InvalidInput(format!("start date '{s}' is not YYYY-MM-DD: {e}")))
}

/// Build `days` contiguous one-day windows beginning at `start`.
pub fn daily_windows(start: NaiveDate, days: u32) -> Result<Vec<TimeWindow>, DataError> {
    if days == 0 {
        return Err(DataError::InvalidInput(
            "day count must be at least 1".into(),
        ));
    }

    (0..u64::from(days))
        .map(|offset| {
            start
                .checked_add_days(Days::new(offset))
                .and_then(TimeWindow::for_day)
                .ok_or_else(|| {
                    DataError::InvalidInput(format!(
                        "{start} + {offset} days is outside the supported calendar"
                    ))
                })
        })
        .collect()
}
