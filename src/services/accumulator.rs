//! Show-hours gating and time-bucket accumulation (write path)
//!
//! One accumulator instance per source: each camera unit owns one for
//! vehicle crossings, the probe poller owns one for device readings.
//! Samples outside the show window are dropped unconditionally, never
//! deferred. A completed bucket is flushed exactly once when the bucket
//! boundary advances, and once more at shutdown if non-empty.

use crate::domain::season::ShowWindow;
use crate::domain::timewin;
use crate::domain::types::{CountRecord, CountType};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct OpenBucket {
    key: DateTime<Utc>,
    value: i64,
}

/// Accumulates gated samples into fixed-width local-time buckets.
///
/// Vehicle semantics: each ingested event adds to the bucket counter, and
/// a bucket is flushed only when non-zero. Device-seen semantics: each
/// sample is an aggregated instantaneous reading, the bucket keeps the
/// latest one, and a completed bucket is always flushed, even at zero.
pub struct BucketAccumulator {
    count_type: CountType,
    source: String,
    camera: Option<String>,
    season: Option<String>,
    tz: Tz,
    window: ShowWindow,
    bucket_minutes: u32,
    open: Option<OpenBucket>,
}

impl BucketAccumulator {
    pub fn new(
        count_type: CountType,
        source: &str,
        tz: Tz,
        window: ShowWindow,
        bucket_minutes: u32,
    ) -> Self {
        Self {
            count_type,
            source: source.to_string(),
            camera: None,
            season: None,
            tz,
            window,
            bucket_minutes: bucket_minutes.max(1),
            open: None,
        }
    }

    pub fn with_camera(mut self, camera: &str) -> Self {
        self.camera = Some(camera.to_string());
        self
    }

    pub fn with_season(mut self, season: Option<&str>) -> Self {
        self.season = season.map(str::to_string);
        self
    }

    /// Show-window membership for an instant
    pub fn in_window(&self, ts: DateTime<Utc>) -> bool {
        self.window.contains(timewin::local_time_of_day(ts, self.tz))
    }

    /// Ingest one gated sample. Returns the previous bucket when this
    /// sample's key advances past it and the previous bucket is flushable.
    pub fn ingest(&mut self, ts: DateTime<Utc>, value: i64) -> Option<CountRecord> {
        if !self.in_window(ts) {
            debug!(
                source = %self.source,
                count_type = %self.count_type.as_str(),
                ts = %ts,
                "sample_outside_show_window"
            );
            return None;
        }

        let key = timewin::floor_bucket(ts, self.tz, self.bucket_minutes);
        if let Some(open) = &mut self.open {
            if open.key == key {
                match self.count_type {
                    CountType::Vehicle => open.value += value,
                    CountType::DeviceSeen => open.value = value,
                }
                return None;
            }
        }

        let flushed = self.take_flushable();
        self.open = Some(OpenBucket { key, value });
        flushed
    }

    /// Advance the bucket boundary without recording a sample. Lets a
    /// camera unit flush a completed bucket while frames keep arriving
    /// but no crossings do. Gated like any sample.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<CountRecord> {
        if !self.in_window(now) {
            return None;
        }
        let key = timewin::floor_bucket(now, self.tz, self.bucket_minutes);
        match self.open {
            Some(open) if open.key != key => {
                let flushed = self.take_flushable();
                self.open = Some(OpenBucket { key, value: 0 });
                flushed
            }
            _ => None,
        }
    }

    /// Snapshot of the open bucket, if any. The probe path upserts this
    /// after each poll so the current bucket is visible before rotation;
    /// the upsert key makes the later rotation flush idempotent.
    pub fn snapshot(&self) -> Option<CountRecord> {
        self.open.map(|open| self.record(open))
    }

    /// Final flush at shutdown
    pub fn finish(&mut self) -> Option<CountRecord> {
        self.take_flushable()
    }

    fn take_flushable(&mut self) -> Option<CountRecord> {
        let open = self.open.take()?;
        if self.count_type == CountType::Vehicle && open.value == 0 {
            return None;
        }
        Some(self.record(open))
    }

    fn record(&self, open: OpenBucket) -> CountRecord {
        CountRecord {
            timestamp: open.key,
            source: self.source.clone(),
            camera: self.camera.clone(),
            count_type: self.count_type,
            value: open.value,
            season: self.season.clone(),
        }
    }
}
