//! Lock-free metrics collection and periodic reporting
//!
//! Counters use atomics so the per-frame hot path never takes a lock.
//! All atomics use Relaxed ordering intentionally - these are statistical
//! counters only, never coordination state.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector shared by every task
pub struct Metrics {
    /// Detection frames received (monotonic)
    frames_total: AtomicU64,
    /// Frames skipped because the show window was closed
    frames_gated: AtomicU64,
    /// Frames that failed to parse off the wire
    frame_parse_failures: AtomicU64,
    /// Frames shed by channel backpressure
    frames_dropped: AtomicU64,
    /// Tripline crossings counted
    crossings_total: AtomicU64,
    /// Vehicle buckets flushed to the store
    buckets_flushed: AtomicU64,
    /// Device rows upserted
    device_upserts: AtomicU64,
    /// Probe polls completed
    probe_polls: AtomicU64,
    /// Probe CSV lines scanned
    probe_lines_scanned: AtomicU64,
    /// Player state samples stored
    status_samples: AtomicU64,
    /// Frames since the last report (reset on report)
    frames_since_report: AtomicU64,
    /// Last report instant, for the frames/sec rate
    last_report: Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_gated: AtomicU64::new(0),
            frame_parse_failures: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            crossings_total: AtomicU64::new(0),
            buckets_flushed: AtomicU64::new(0),
            device_upserts: AtomicU64::new(0),
            probe_polls: AtomicU64::new(0),
            probe_lines_scanned: AtomicU64::new(0),
            status_samples: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            last_report: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_frame(&self) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_gated(&self) {
        self.frames_gated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_parse_failure(&self) {
        self.frame_parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_crossing(&self) {
        self.crossings_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_bucket_flushed(&self) {
        self.buckets_flushed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_device_upsert(&self) {
        self.device_upserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_poll(&self, lines_scanned: u64) {
        self.probe_polls.fetch_add(1, Ordering::Relaxed);
        self.probe_lines_scanned.fetch_add(lines_scanned, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_status_sample(&self) {
        self.status_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters; resets the frames/sec window
    pub fn report(&self) -> MetricsSummary {
        let frames = self.frames_since_report.swap(0, Ordering::Relaxed);
        let elapsed = {
            let mut last = self.last_report.lock();
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };
        let frames_per_sec = if elapsed > 0.0 { frames as f64 / elapsed } else { 0.0 };

        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_gated: self.frames_gated.load(Ordering::Relaxed),
            frame_parse_failures: self.frame_parse_failures.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            crossings_total: self.crossings_total.load(Ordering::Relaxed),
            buckets_flushed: self.buckets_flushed.load(Ordering::Relaxed),
            device_upserts: self.device_upserts.load(Ordering::Relaxed),
            probe_polls: self.probe_polls.load(Ordering::Relaxed),
            probe_lines_scanned: self.probe_lines_scanned.load(Ordering::Relaxed),
            status_samples: self.status_samples.load(Ordering::Relaxed),
            frames_per_sec,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time counter snapshot
#[derive(Debug, Clone, Copy)]
pub struct MetricsSummary {
    pub frames_total: u64,
    pub frames_gated: u64,
    pub frame_parse_failures: u64,
    pub frames_dropped: u64,
    pub crossings_total: u64,
    pub buckets_flushed: u64,
    pub device_upserts: u64,
    pub probe_polls: u64,
    pub probe_lines_scanned: u64,
    pub status_samples: u64,
    pub frames_per_sec: f64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames_total = self.frames_total,
            frames_per_sec = self.frames_per_sec,
            frames_gated = self.frames_gated,
            frames_dropped = self.frames_dropped,
            parse_failures = self.frame_parse_failures,
            crossings = self.crossings_total,
            buckets_flushed = self.buckets_flushed,
            device_upserts = self.device_upserts,
            probe_polls = self.probe_polls,
            status_samples = self.status_samples,
            "metrics_summary"
        );
    }
}
