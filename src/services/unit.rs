//! Per-camera concurrency unit
//!
//! One unit per configured camera owns its own tracker/accumulator pair;
//! nothing is shared across units except the read-only season context and
//! the count store. Detection frames arrive on a bounded channel from the
//! MQTT ingest task; flushing a completed bucket to the store is the
//! unit's only externally visible side effect and happens in-line.

use crate::domain::season::SeasonContext;
use crate::domain::types::{CountRecord, CountType, DetectionFrame, Point, SOURCE_TRIPLINE};
use crate::infra::config::CameraConfig;
use crate::infra::metrics::Metrics;
use crate::io::store::CountStore;
use crate::services::accumulator::BucketAccumulator;
use crate::services::tracker::ObjectTracker;
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub struct CameraUnit {
    camera: String,
    tracker: ObjectTracker,
    accumulator: BucketAccumulator,
    store: Arc<dyn CountStore>,
    metrics: Arc<Metrics>,
}

impl CameraUnit {
    /// Build a unit from camera config, resolving the active season once
    /// at startup for bucket width and show window.
    pub fn from_config(
        cam: &CameraConfig,
        seasons: &SeasonContext,
        tz: Tz,
        store: Arc<dyn CountStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let season = seasons.resolve(Utc::now());
        let window = SeasonContext::window_for(season);
        let bucket_minutes = SeasonContext::bucket_minutes_for(season);

        let tripline = cam.tripline();
        if tripline.is_none() {
            warn!(camera = %cam.name, "camera_without_tripline_never_counts");
        }

        let tracker = ObjectTracker::new(&cam.name, tripline, cam.roi_polygon());
        let accumulator =
            BucketAccumulator::new(CountType::Vehicle, SOURCE_TRIPLINE, tz, window, bucket_minutes)
                .with_camera(&cam.name)
                .with_season(season.map(|s| s.name.as_str()));

        Self { camera: cam.name.clone(), tracker, accumulator, store, metrics }
    }

    #[cfg(test)]
    pub fn new_for_test(
        camera: &str,
        tracker: ObjectTracker,
        accumulator: BucketAccumulator,
        store: Arc<dyn CountStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { camera: camera.to_string(), tracker, accumulator, store, metrics }
    }

    /// Consume frames until the channel closes or shutdown is signaled,
    /// then perform the final flush.
    pub async fn run(
        mut self,
        mut frames: mpsc::Receiver<DetectionFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(camera = %self.camera, "camera_unit_started");

        loop {
            tokio::select! {
                frame = frames.recv() => {
                    match frame {
                        Some(frame) => self.process_frame(frame),
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(record) = self.accumulator.finish() {
            self.flush(record);
        }
        info!(camera = %self.camera, "camera_unit_stopped");
    }

    /// One frame through the pipeline: gate, rotate bucket, track, count
    pub fn process_frame(&mut self, frame: DetectionFrame) {
        let now = frame.ts.unwrap_or_else(Utc::now);
        self.metrics.record_frame();

        // Outside show hours the whole pipeline idles; nothing is deferred
        if !self.accumulator.in_window(now) {
            self.metrics.record_frame_gated();
            return;
        }

        if let Some(record) = self.accumulator.tick(now) {
            self.flush(record);
        }

        let points: &[Point] = &frame.points;
        for event in self.tracker.step(points, now) {
            self.metrics.record_crossing();
            debug!(camera = %self.camera, ts = %event.timestamp, "vehicle_counted");
            if let Some(record) = self.accumulator.ingest(event.timestamp, 1) {
                self.flush(record);
            }
        }
    }

    fn flush(&self, record: CountRecord) {
        info!(
            camera = %self.camera,
            bucket = %record.timestamp,
            count = record.value,
            "vehicle_bucket_flushed"
        );
        self.store.append(&record);
        self.metrics.record_bucket_flushed();
    }

    /// Number of live tracks, for diagnostics
    pub fn active_tracks(&self) -> usize {
        self.tracker.active_tracks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::season::ShowWindow;
    use crate::io::store::JsonlCountStore;
    use crate::services::tracker::{RoiPolygon, Tripline};
    use chrono::{DateTime, TimeZone};
    use chrono_tz::America::Chicago;
    use tempfile::tempdir;

    fn chicago(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Chicago.with_ymd_and_hms(2025, 12, 1, h, mi, s).unwrap().with_timezone(&Utc)
    }

    fn frame(ts: DateTime<Utc>, points: &[(f64, f64)]) -> DetectionFrame {
        DetectionFrame {
            camera: Some("cam".to_string()),
            ts: Some(ts),
            points: points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        }
    }

    #[test]
    fn test_frames_to_flushed_bucket() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonlCountStore::open(dir.path().join("counts.jsonl")).unwrap());

        let tripline = Tripline::new(Point::new(50.0, 0.0), Point::new(50.0, 100.0));
        let tracker = ObjectTracker::new("cam", Some(tripline), RoiPolygon::default());
        let accumulator = BucketAccumulator::new(
            CountType::Vehicle,
            SOURCE_TRIPLINE,
            Chicago,
            ShowWindow::open(),
            1,
        )
        .with_camera("cam");
        let mut unit = CameraUnit::new_for_test(
            "cam",
            tracker,
            accumulator,
            store.clone(),
            Arc::new(Metrics::new()),
        );

        // A blob crosses the line at 20:00, then frames continue into the
        // next minute, completing the bucket
        unit.process_frame(frame(chicago(20, 0, 1), &[(40.0, 50.0)]));
        unit.process_frame(frame(chicago(20, 0, 2), &[(60.0, 50.0)]));
        unit.process_frame(frame(chicago(20, 1, 0), &[]));

        let rows = store.query(CountType::Vehicle, &Default::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 1);
        assert_eq!(rows[0].timestamp, chicago(20, 0, 0));
        assert_eq!(rows[0].camera.as_deref(), Some("cam"));
    }

    #[test]
    fn test_gated_frame_never_tracks() {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonlCountStore::open(dir.path().join("counts.jsonl")).unwrap());

        let tripline = Tripline::new(Point::new(50.0, 0.0), Point::new(50.0, 100.0));
        let tracker = ObjectTracker::new("cam", Some(tripline), RoiPolygon::default());
        let accumulator = BucketAccumulator::new(
            CountType::Vehicle,
            SOURCE_TRIPLINE,
            Chicago,
            ShowWindow::parse("17:00", "23:00"),
            1,
        );
        let mut unit = CameraUnit::new_for_test(
            "cam",
            tracker,
            accumulator,
            store.clone(),
            Arc::new(Metrics::new()),
        );

        unit.process_frame(frame(chicago(23, 30, 0), &[(40.0, 50.0)]));
        unit.process_frame(frame(chicago(23, 30, 1), &[(60.0, 50.0)]));
        assert_eq!(unit.active_tracks(), 0);
        assert!(store.query(CountType::Vehicle, &Default::default()).is_empty());
    }
}
