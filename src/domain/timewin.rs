//! Local-wall-clock bucket math
//!
//! Bucket keys are local wall-clock instants persisted as UTC. Local/UTC
//! conversion is a recurring DST hazard, so this module is the single
//! place that does it; the write path (accumulator) and the read path
//! (aggregator, report) both go through here.

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

/// Floor a UTC instant to its containing bucket: truncate to the minute,
/// then floor the local minute-of-hour to a multiple of `bucket_minutes`.
/// Returns the bucket key as the corresponding UTC instant.
pub fn floor_bucket(ts: DateTime<Utc>, tz: Tz, bucket_minutes: u32) -> DateTime<Utc> {
    let minutes = i64::from(bucket_minutes.max(1));
    let local = ts.with_timezone(&tz);
    let trimmed = local
        - Duration::nanoseconds(i64::from(local.nanosecond()))
        - Duration::seconds(i64::from(local.second()));
    let floored = trimmed - Duration::minutes(i64::from(trimmed.minute()) % minutes);
    floored.with_timezone(&Utc)
}

/// Local time-of-day of a UTC instant, for show-window membership tests
pub fn local_time_of_day(ts: DateTime<Utc>, tz: Tz) -> NaiveTime {
    ts.with_timezone(&tz).time()
}

/// Display granularity for re-bucketed series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Minute,
    Hour,
    Day,
}

impl Grouping {
    /// Parse a grouping keyword; anything unrecognized falls back to hourly
    pub fn parse(s: &str) -> Self {
        match s {
            "min" | "minute" => Grouping::Minute,
            "day" => Grouping::Day,
            _ => Grouping::Hour,
        }
    }

    /// Bucket label for a UTC instant rendered in the display timezone
    pub fn label(&self, ts: DateTime<Utc>, tz: Tz) -> String {
        let local = ts.with_timezone(&tz);
        match self {
            Grouping::Minute => local.format("%Y-%m-%d %H:%M").to_string(),
            Grouping::Hour => local.format("%Y-%m-%d %H:00").to_string(),
            Grouping::Day => local.format("%Y-%m-%d").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::Chicago;

    fn chicago(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Chicago.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_floor_bucket_one_minute() {
        let ts = chicago(2025, 12, 1, 10, 0, 40);
        let floored = floor_bucket(ts, Chicago, 1);
        assert_eq!(floored, chicago(2025, 12, 1, 10, 0, 0));
    }

    #[test]
    fn test_floor_bucket_five_minutes() {
        let ts = chicago(2025, 12, 1, 18, 7, 33);
        let floored = floor_bucket(ts, Chicago, 5);
        assert_eq!(floored, chicago(2025, 12, 1, 18, 5, 0));
    }

    #[test]
    fn test_floor_bucket_aligned_to_local_hour() {
        // Every bucket key must sit on a multiple of bucket_minutes past
        // the top of the local hour.
        let ts = chicago(2025, 12, 1, 21, 59, 59);
        for minutes in [1u32, 2, 5, 10, 15, 30] {
            let local = floor_bucket(ts, Chicago, minutes).with_timezone(&Chicago);
            assert_eq!(local.minute() % minutes, 0, "bucket_minutes={minutes}");
            assert_eq!(local.second(), 0);
        }
    }

    #[test]
    fn test_floor_bucket_idempotent() {
        let ts = chicago(2025, 12, 1, 18, 7, 33);
        let once = floor_bucket(ts, Chicago, 15);
        assert_eq!(floor_bucket(once, Chicago, 15), once);
    }

    #[test]
    fn test_local_time_of_day() {
        // 23:30 local on Dec 1 is 05:30 UTC the next day (CST, UTC-6)
        let ts: DateTime<Utc> = "2025-12-02T05:30:00Z".parse().unwrap();
        let local = local_time_of_day(ts, Chicago);
        assert_eq!(local, NaiveTime::from_hms_opt(23, 30, 0).unwrap());
    }

    #[test]
    fn test_grouping_parse() {
        assert_eq!(Grouping::parse("min"), Grouping::Minute);
        assert_eq!(Grouping::parse("minute"), Grouping::Minute);
        assert_eq!(Grouping::parse("day"), Grouping::Day);
        assert_eq!(Grouping::parse("hour"), Grouping::Hour);
        assert_eq!(Grouping::parse("weird"), Grouping::Hour);
    }

    #[test]
    fn test_grouping_labels_render_in_display_timezone() {
        let ts = chicago(2025, 12, 1, 22, 7, 0);
        assert_eq!(Grouping::Minute.label(ts, Chicago), "2025-12-01 22:07");
        assert_eq!(Grouping::Hour.label(ts, Chicago), "2025-12-01 22:00");
        assert_eq!(Grouping::Day.label(ts, Chicago), "2025-12-01");
    }
}
