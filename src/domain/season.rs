//! Season calendar and show-hours windows
//!
//! A season is a named date range with its own bucket width and show
//! window. Seasons are loaded from config and read-only at runtime; the
//! concurrency units only ever look them up.

use chrono::{DateTime, NaiveTime, Utc};
use serde::Deserialize;
use tracing::warn;

/// Named date range with bucket width and show-hours window
#[derive(Debug, Clone, Deserialize)]
pub struct Season {
    pub name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Local wall-clock "HH:MM"
    #[serde(default = "default_show_start")]
    pub show_start: String,
    /// Local wall-clock "HH:MM"
    #[serde(default = "default_show_end")]
    pub show_end: String,
    #[serde(default = "default_bucket_minutes")]
    pub bucket_minutes: u32,
}

fn default_show_start() -> String {
    "17:00".to_string()
}

fn default_show_end() -> String {
    "23:00".to_string()
}

fn default_bucket_minutes() -> u32 {
    1
}

/// Parse a local "HH:MM" wall-clock string
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    NaiveTime::from_hms_opt(h, m, 0)
}

/// Local time-of-day window `[start, end)`. When `end <= start` the window
/// wraps past midnight; `start == end` keeps the window fully open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl ShowWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Always-open window
    pub fn open() -> Self {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default();
        Self { start: midnight, end: midnight }
    }

    /// Parse from "HH:MM" bounds; malformed bounds fall back to fully open
    pub fn parse(start: &str, end: &str) -> Self {
        match (parse_hhmm(start), parse_hhmm(end)) {
            (Some(s), Some(e)) => Self::new(s, e),
            _ => {
                warn!(start = %start, end = %end, "show_window_unparseable_defaulting_open");
                Self::open()
            }
        }
    }

    /// Membership test for a local time-of-day
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.end <= self.start {
            t >= self.start || t < self.end
        } else {
            t >= self.start && t < self.end
        }
    }
}

/// Read-only season lookup shared across all concurrency units
#[derive(Debug, Clone, Default)]
pub struct SeasonContext {
    seasons: Vec<Season>,
}

impl SeasonContext {
    pub fn new(seasons: Vec<Season>) -> Self {
        Self { seasons }
    }

    /// The season whose date range contains `now` (start <= now < end)
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<&Season> {
        self.seasons.iter().find(|s| s.start_date <= now && s.end_date > now)
    }

    /// The most recently started season, regardless of date containment.
    /// The probe path labels device rows with this even between seasons.
    pub fn latest(&self) -> Option<&Season> {
        self.seasons.iter().max_by_key(|s| s.start_date)
    }

    /// Show window for a resolved season; absence keeps the window open
    pub fn window_for(season: Option<&Season>) -> ShowWindow {
        match season {
            Some(s) => ShowWindow::parse(&s.show_start, &s.show_end),
            None => ShowWindow::open(),
        }
    }

    /// Bucket width for a resolved season; absence means 1-minute buckets
    pub fn bucket_minutes_for(season: Option<&Season>) -> u32 {
        season.map(|s| s.bucket_minutes.max(1)).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn season(name: &str, start: &str, end: &str) -> Season {
        Season {
            name: name.to_string(),
            start_date: start.parse().unwrap(),
            end_date: end.parse().unwrap(),
            show_start: "17:00".to_string(),
            show_end: "23:00".to_string(),
            bucket_minutes: 5,
        }
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("17:00"), Some(t(17, 0)));
        assert_eq!(parse_hhmm("00:30"), Some(t(0, 30)));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("late"), None);
    }

    #[test]
    fn test_window_plain() {
        let w = ShowWindow::parse("17:00", "23:00");
        assert!(w.contains(t(17, 0)));
        assert!(w.contains(t(22, 59)));
        assert!(!w.contains(t(23, 0)));
        assert!(!w.contains(t(23, 30)));
        assert!(!w.contains(t(10, 0)));
    }

    #[test]
    fn test_window_wraps_midnight() {
        let w = ShowWindow::parse("22:00", "02:00");
        assert!(w.contains(t(22, 0)));
        assert!(w.contains(t(0, 30)));
        assert!(w.contains(t(1, 59)));
        assert!(!w.contains(t(2, 0)));
        assert!(!w.contains(t(10, 0)));
    }

    #[test]
    fn test_window_open() {
        let w = ShowWindow::open();
        assert!(w.contains(t(0, 0)));
        assert!(w.contains(t(12, 0)));
        assert!(w.contains(t(23, 59)));
    }

    #[test]
    fn test_window_parse_fallback() {
        let w = ShowWindow::parse("17:xx", "23:00");
        assert_eq!(w, ShowWindow::open());
    }

    #[test]
    fn test_resolve_by_date() {
        let ctx = SeasonContext::new(vec![
            season("halloween", "2025-10-01T00:00:00Z", "2025-11-03T00:00:00Z"),
            season("christmas", "2025-11-20T00:00:00Z", "2026-01-05T00:00:00Z"),
        ]);

        let now: DateTime<Utc> = "2025-12-10T01:00:00Z".parse().unwrap();
        assert_eq!(ctx.resolve(now).unwrap().name, "christmas");

        let between: DateTime<Utc> = "2025-11-10T01:00:00Z".parse().unwrap();
        assert!(ctx.resolve(between).is_none());

        // end_date is exclusive
        let at_end: DateTime<Utc> = "2026-01-05T00:00:00Z".parse().unwrap();
        assert!(ctx.resolve(at_end).is_none());
    }

    #[test]
    fn test_latest_season() {
        let ctx = SeasonContext::new(vec![
            season("halloween", "2025-10-01T00:00:00Z", "2025-11-03T00:00:00Z"),
            season("christmas", "2025-11-20T00:00:00Z", "2026-01-05T00:00:00Z"),
        ]);
        assert_eq!(ctx.latest().unwrap().name, "christmas");
        assert!(SeasonContext::default().latest().is_none());
    }

    #[test]
    fn test_defaults_without_season() {
        assert_eq!(SeasonContext::bucket_minutes_for(None), 1);
        assert_eq!(SeasonContext::window_for(None), ShowWindow::open());
    }
}
