//! Read-side series building, baseline normalization, and correlation
//!
//! Everything here is a pure function over ordered in-memory rows; the
//! store hands us pre-filtered slices and the dashboard-facing callers
//! decide grouping, timezone, and baseline. Nothing mutates write-path
//! state, and reads tolerate rows written by in-flight flushes.

use crate::domain::timewin::Grouping;
use crate::domain::types::{CountRecord, CountType, StateSample};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Label used when a primary event precedes every secondary sample
pub const UNKNOWN_LABEL: &str = "unknown";

/// Number of trailing days of readings used for the auto baseline
pub const BASELINE_WINDOW_DAYS: i64 = 7;

/// Labeled count, used both for series peaks and correlation groups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledCount {
    pub label: String,
    pub count: i64,
}

/// Display-ready series for one count type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub labels: Vec<String>,
    pub values: Vec<i64>,
    pub total: i64,
    pub peak: Option<LabeledCount>,
}

/// Re-bucket stored rows into a display series.
///
/// Vehicle buckets sum their constituent raw values. Device-seen buckets
/// take the rounded arithmetic mean of baseline-subtracted values (floor
/// subtraction clamps at zero per row). The asymmetry mirrors how each
/// stream is produced: crossings are discrete counts, probe readings are
/// noisy instantaneous levels.
pub fn build_series(
    count_type: CountType,
    rows: &[CountRecord],
    group: Grouping,
    tz: Tz,
    baseline: i64,
) -> Series {
    let mut buckets: FxHashMap<String, (i64, u32)> = FxHashMap::default();

    for row in rows {
        let label = group.label(row.timestamp, tz);
        let entry = buckets.entry(label).or_insert((0, 0));
        match count_type {
            CountType::Vehicle => entry.0 += row.value,
            CountType::DeviceSeen => entry.0 += (row.value - baseline).max(0),
        }
        entry.1 += 1;
    }

    let mut labels: Vec<String> = buckets.keys().cloned().collect();
    labels.sort();

    let values: Vec<i64> = labels
        .iter()
        .map(|label| {
            let (sum, n) = buckets[label];
            match count_type {
                CountType::Vehicle => sum,
                CountType::DeviceSeen => (sum as f64 / f64::from(n.max(1))).round() as i64,
            }
        })
        .collect();

    let total = values.iter().sum();
    let peak = peak_of(&labels, &values);

    Series { labels, values, total, peak }
}

/// First bucket reaching the maximum wins ties (labels scanned ascending)
fn peak_of(labels: &[String], values: &[i64]) -> Option<LabeledCount> {
    let mut best: Option<(usize, i64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, top)) if v <= top => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, count)| LabeledCount { label: labels[i].clone(), count })
}

/// Robust noise floor over raw device readings: the value at rank
/// `max(0, floor(n * 0.10) - 1)` after an ascending sort. Returns None
/// for an empty window so callers can fall back to a configured value.
pub fn auto_baseline(mut readings: Vec<i64>) -> Option<i64> {
    if readings.is_empty() {
        return None;
    }
    readings.sort_unstable();
    let idx = ((readings.len() as f64 * 0.10) as usize).saturating_sub(1);
    Some(readings[idx])
}

/// Single-pass merge join of primary events against an ordered
/// discrete-state stream.
///
/// For each primary (timestamp, count) the cursor advances to the latest
/// secondary sample at or before it; the cursor only moves forward, so
/// the whole join is O(n+m). Events preceding every sample, and samples
/// with an empty label, resolve to [`UNKNOWN_LABEL`]. Returns per-label
/// totals sorted descending, truncated to `top_k`.
pub fn correlate(
    primary: &[(DateTime<Utc>, i64)],
    secondary: &[StateSample],
    top_k: usize,
) -> Vec<LabeledCount> {
    let mut totals: FxHashMap<&str, i64> = FxHashMap::default();
    let mut cursor = 0usize;

    for (ts, count) in primary {
        while cursor + 1 < secondary.len() && secondary[cursor + 1].timestamp <= *ts {
            cursor += 1;
        }
        let label = match secondary.get(cursor) {
            Some(s) if s.timestamp <= *ts && !s.label.is_empty() => s.label.as_str(),
            _ => UNKNOWN_LABEL,
        };
        *totals.entry(label).or_insert(0) += count;
    }

    let mut groups: Vec<LabeledCount> = totals
        .into_iter()
        .map(|(label, count)| LabeledCount { label: label.to_string(), count })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    groups.truncate(top_k);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{SOURCE_PROBE, SOURCE_TRIPLINE};
    use chrono::TimeZone;
    use chrono_tz::America::Chicago;

    fn chicago(h: u32, mi: u32) -> DateTime<Utc> {
        Chicago.with_ymd_and_hms(2025, 12, 1, h, mi, 0).unwrap().with_timezone(&Utc)
    }

    fn row(count_type: CountType, ts: DateTime<Utc>, value: i64) -> CountRecord {
        let source = match count_type {
            CountType::Vehicle => SOURCE_TRIPLINE,
            CountType::DeviceSeen => SOURCE_PROBE,
        };
        CountRecord {
            timestamp: ts,
            source: source.to_string(),
            camera: None,
            count_type,
            value,
            season: None,
        }
    }

    #[test]
    fn test_device_mean_vs_vehicle_sum() {
        // The same raw values in one display bucket: device_seen averages
        // (rounded), vehicle sums.
        let values = [5, 6, 4, 50, 5];

        let dev: Vec<CountRecord> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| row(CountType::DeviceSeen, chicago(18, i as u32), v))
            .collect();
        let series = build_series(CountType::DeviceSeen, &dev, Grouping::Hour, Chicago, 0);
        assert_eq!(series.values, vec![14]);
        assert_eq!(series.total, 14);

        let veh: Vec<CountRecord> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| row(CountType::Vehicle, chicago(18, i as u32), v))
            .collect();
        let series = build_series(CountType::Vehicle, &veh, Grouping::Hour, Chicago, 0);
        assert_eq!(series.values, vec![70]);
        assert_eq!(series.total, 70);
    }

    #[test]
    fn test_minute_rebucketing_labels() {
        let rows = vec![
            row(CountType::Vehicle, chicago(10, 0), 2),
            row(CountType::Vehicle, chicago(10, 1), 1),
        ];
        let series = build_series(CountType::Vehicle, &rows, Grouping::Minute, Chicago, 0);
        assert_eq!(series.labels, vec!["2025-12-01 10:00", "2025-12-01 10:01"]);
        assert_eq!(series.values, vec![2, 1]);
    }

    #[test]
    fn test_baseline_subtraction_clamps_at_zero() {
        let rows = vec![
            row(CountType::DeviceSeen, chicago(18, 0), 3),
            row(CountType::DeviceSeen, chicago(18, 1), 10),
        ];
        // Baseline 5: 3 clamps to 0, 10 becomes 5, mean rounds to 3
        let series = build_series(CountType::DeviceSeen, &rows, Grouping::Hour, Chicago, 5);
        assert_eq!(series.values, vec![3]);
    }

    #[test]
    fn test_peak_first_bucket_wins_tie() {
        let rows = vec![
            row(CountType::Vehicle, chicago(10, 0), 5),
            row(CountType::Vehicle, chicago(11, 0), 5),
        ];
        let series = build_series(CountType::Vehicle, &rows, Grouping::Hour, Chicago, 0);
        let peak = series.peak.unwrap();
        assert_eq!(peak.label, "2025-12-01 10:00");
        assert_eq!(peak.count, 5);
    }

    #[test]
    fn test_empty_series() {
        let series = build_series(CountType::Vehicle, &[], Grouping::Hour, Chicago, 0);
        assert!(series.labels.is_empty());
        assert_eq!(series.total, 0);
        assert!(series.peak.is_none());
    }

    #[test]
    fn test_auto_baseline_rank() {
        let readings = vec![1, 2, 2, 3, 3, 4, 5, 8, 9, 20];
        assert_eq!(auto_baseline(readings), Some(1));
    }

    #[test]
    fn test_auto_baseline_small_and_empty() {
        assert_eq!(auto_baseline(vec![7, 3, 5]), Some(3));
        assert_eq!(auto_baseline(vec![]), None);
    }

    #[test]
    fn test_auto_baseline_unsorted_input() {
        // 20 readings: rank max(0, floor(20*0.10)-1) = 1 after sorting
        let readings = vec![9, 4, 17, 2, 11, 6, 14, 1, 19, 8, 3, 12, 5, 16, 7, 20, 10, 13, 18, 15];
        assert_eq!(auto_baseline(readings), Some(2));
    }

    fn sample(ts_min: u32, label: &str) -> StateSample {
        StateSample { timestamp: chicago(18, ts_min), label: label.to_string() }
    }

    #[test]
    fn test_correlate_merge_join() {
        let primary = vec![
            (chicago(18, 10), 1),
            (chicago(18, 20), 1),
            (chicago(18, 30), 1),
        ];
        let secondary = vec![sample(5, "A"), sample(25, "B")];

        let groups = correlate(&primary, &secondary, 10);
        assert_eq!(
            groups,
            vec![
                LabeledCount { label: "A".to_string(), count: 2 },
                LabeledCount { label: "B".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_correlate_event_before_all_samples_is_unknown() {
        let primary = vec![(chicago(18, 2), 3)];
        let secondary = vec![sample(5, "A")];
        let groups = correlate(&primary, &secondary, 10);
        assert_eq!(groups, vec![LabeledCount { label: UNKNOWN_LABEL.to_string(), count: 3 }]);
    }

    #[test]
    fn test_correlate_empty_secondary_stream() {
        let primary = vec![(chicago(18, 2), 3), (chicago(18, 9), 4)];
        let groups = correlate(&primary, &[], 10);
        assert_eq!(groups, vec![LabeledCount { label: UNKNOWN_LABEL.to_string(), count: 7 }]);
    }

    #[test]
    fn test_correlate_sorted_descending_and_truncated() {
        let primary = vec![
            (chicago(18, 6), 1),
            (chicago(18, 11), 5),
            (chicago(18, 21), 2),
        ];
        let secondary = vec![sample(5, "A"), sample(10, "B"), sample(20, "C")];

        let groups = correlate(&primary, &secondary, 2);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "B");
        assert_eq!(groups[0].count, 5);
        assert_eq!(groups[1].label, "C");
    }
}
