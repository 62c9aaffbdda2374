//! Daily local-time windows.
//!
//! A [`DailyJob`] fires at most once per local date, on the first check that
//! falls inside its [`DailyWindow`]. Jobs that can fail use `due` and only
//! `complete` on success, so later checks in the same window retry. Callers convert wall-clock time to local
//! time themselves; this module never touches time zones.

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Inclusive local-time window, written as `"HH:MM-HH:MM"`.
///
/// A window whose start is after its end wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DailyWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl DailyWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Build from hour/minute pairs.
    pub fn from_hm(start: (u32, u32), end: (u32, u32)) -> crate::Result<Self> {
        let make = |(h, m): (u32, u32)| {
            NaiveTime::from_hms_opt(h, m, 0)
                .ok_or_else(|| CoreError::InvalidWindow(format!("{h:02}:{m:02}")))
        };
        Ok(Self::new(make(start)?, make(end)?))
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    fn wraps(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps() {
            time >= self.start || time <= self.end
        } else {
            time >= self.start && time <= self.end
        }
    }

    /// Date the window occurrence containing `local` started on.
    fn occurrence_date(&self, local: NaiveDateTime) -> NaiveDate {
        if self.wraps() && local.time() <= self.end {
            local.date() - Duration::days(1)
        } else {
            local.date()
        }
    }
}

impl fmt::Display for DailyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

impl TryFrom<String> for DailyWindow {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (start, end) = value
            .split_once('-')
            .ok_or_else(|| CoreError::InvalidWindow(value.clone()))?;
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|e| CoreError::InvalidWindow(format!("{value}: {e}")))
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }
}

impl From<DailyWindow> for String {
    fn from(window: DailyWindow) -> Self {
        window.to_string()
    }
}

/// Once-per-day trigger bound to a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyJob {
    window: DailyWindow,
    last_run: Option<NaiveDate>,
}

impl DailyJob {
    pub fn new(window: DailyWindow) -> Self {
        Self {
            window,
            last_run: None,
        }
    }

    pub fn window(&self) -> DailyWindow {
        self.window
    }

    pub fn last_run(&self) -> Option<NaiveDate> {
        self.last_run
    }

    /// True inside the window when the current occurrence has not been
    /// completed yet.
    pub fn due(&self, local: NaiveDateTime) -> bool {
        self.window.contains(local.time())
            && self.last_run != Some(self.window.occurrence_date(local))
    }

    /// Record the occurrence containing `local` as done.
    pub fn complete(&mut self, local: NaiveDateTime) {
        self.last_run = Some(self.window.occurrence_date(local));
    }

    /// Returns true (and records the run) the first time it is polled inside
    /// the window on a given date.
    pub fn poll(&mut self, local: NaiveDateTime) -> bool {
        if !self.due(local) {
            return false;
        }
        self.complete(local);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: (i32, u32, u32), h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_window_parse_and_display() {
        let window = DailyWindow::try_from("23:40-23:45".to_string()).unwrap();
        assert_eq!(window.to_string(), "23:40-23:45");
        assert!(DailyWindow::try_from("23:40".to_string()).is_err());
        assert!(DailyWindow::try_from("25:00-26:00".to_string()).is_err());
    }

    #[test]
    fn test_window_contains_inclusive() {
        let window = DailyWindow::from_hm((23, 40), (23, 45)).unwrap();
        assert!(window.contains(NaiveTime::from_hms_opt(23, 40, 0).unwrap()));
        assert!(window.contains(NaiveTime::from_hms_opt(23, 45, 0).unwrap()));
        assert!(!window.contains(NaiveTime::from_hms_opt(23, 46, 0).unwrap()));
    }

    #[test]
    fn test_job_fires_once_per_day() {
        let mut job = DailyJob::new(DailyWindow::from_hm((0, 16), (0, 20)).unwrap());

        assert!(!job.poll(at((2026, 3, 2), 0, 10)));
        assert!(job.poll(at((2026, 3, 2), 0, 16)));
        assert!(!job.poll(at((2026, 3, 2), 0, 18)));
        assert!(job.poll(at((2026, 3, 3), 0, 19)));
    }

    #[test]
    fn test_wrapping_window_counts_as_one_occurrence() {
        let mut job = DailyJob::new(DailyWindow::from_hm((23, 50), (0, 10)).unwrap());

        assert!(job.poll(at((2026, 3, 2), 23, 55)));
        // Same occurrence after midnight.
        assert!(!job.poll(at((2026, 3, 3), 0, 5)));
        assert!(job.poll(at((2026, 3, 3), 23, 51)));
    }

    #[test]
    fn test_incomplete_job_stays_due_within_window() {
        let mut job = DailyJob::new(DailyWindow::from_hm((23, 40), (23, 45)).unwrap());

        assert!(job.due(at((2026, 3, 2), 23, 40)));
        // Not completed: still due on the next check in the window.
        assert!(job.due(at((2026, 3, 2), 23, 42)));
        job.complete(at((2026, 3, 2), 23, 42));
        assert!(!job.due(at((2026, 3, 2), 23, 44)));
        assert_eq!(job.last_run(), NaiveDate::from_ymd_opt(2026, 3, 2));

        assert!(!job.due(at((2026, 3, 3), 23, 39)));
        assert!(job.due(at((2026, 3, 3), 23, 40)));
    }
}
