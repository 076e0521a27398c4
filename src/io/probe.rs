//! Wi-Fi probe-count ingest
//!
//! The probe sensor exports a rolling CSV of "epoch,count" lines, one per
//! minute, where count is the instantaneous number of distinct devices
//! seen. The poller fetches the export on an interval, feeds every line
//! through a device_seen accumulator, and upserts flushed buckets - the
//! upsert key makes overlapping exports idempotent.

use crate::domain::season::SeasonContext;
use crate::domain::types::{CountRecord, CountType, SOURCE_PROBE};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::store::CountStore;
use crate::services::accumulator::BucketAccumulator;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Parse one "epoch,count" line. Epoch may be seconds or milliseconds
/// (values above 1e12 are treated as ms); count is truncated to an
/// integer. Returns None for anything malformed.
fn parse_line(line: &str) -> Option<(DateTime<Utc>, i64)> {
    let mut parts = line.split(',');
    let epoch: f64 = parts.next()?.trim().parse().ok()?;
    let count: f64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let secs = if epoch > 1e12 { epoch / 1000.0 } else { epoch };
    let ts = DateTime::from_timestamp(secs as i64, 0)?;
    Some((ts, count as i64))
}

/// Polls the probe CSV export and drives the device_seen write path
pub struct ProbePoller {
    url: String,
    poll_interval: Duration,
    accumulator: BucketAccumulator,
    store: Arc<dyn CountStore>,
    metrics: Arc<Metrics>,
    client: reqwest::Client,
}

impl ProbePoller {
    /// Build the poller, or None when no probe URL is configured
    pub fn from_config(
        config: &Config,
        seasons: &SeasonContext,
        store: Arc<dyn CountStore>,
        metrics: Arc<Metrics>,
    ) -> Option<Self> {
        let url = config.probe_url()?.to_string();

        // Device rows carry the most recently started season's label even
        // between seasons; gating and bucket width follow the same season.
        let season = seasons.latest();
        let window = SeasonContext::window_for(season);
        let bucket_minutes = SeasonContext::bucket_minutes_for(season);

        let accumulator = BucketAccumulator::new(
            CountType::DeviceSeen,
            SOURCE_PROBE,
            config.tz(),
            window,
            bucket_minutes,
        )
        .with_season(season.map(|s| s.name.as_str()));

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();

        Some(Self {
            url,
            poll_interval: Duration::from_secs(config.probe_poll_interval_secs()),
            accumulator,
            store,
            metrics,
            client,
        })
    }

    /// Poll until shutdown; failures are logged and retried next interval
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(url = %self.url, interval_secs = self.poll_interval.as_secs(), "probe_poller_started");
        let mut ticker = interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "probe_poll_failed");
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
            self.store.upsert(&record);
        }
        info!("probe_poller_stopped");
    }

    async fn poll_once(&mut self) -> anyhow::Result<()> {
        let text = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let (scanned, upserts) = self.ingest_csv(&text);
        self.metrics.record_probe_poll(scanned);
        info!(scanned, upserts, "probe_poll_complete");
        Ok(())
    }

    /// Feed a CSV export through the accumulator; returns (scanned, upserts)
    fn ingest_csv(&mut self, text: &str) -> (u64, u64) {
        let mut scanned = 0u64;
        let mut upserts = 0u64;

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            scanned += 1;
            let Some((ts, count)) = parse_line(line) else { continue };
            if let Some(record) = self.accumulator.ingest(ts, count) {
                if self.upsert(record) {
                    upserts += 1;
                }
            }
        }

        // Make the still-open bucket visible without consuming it; the
        // eventual rotation flush hits the same upsert key.
        if let Some(record) = self.accumulator.snapshot() {
            if self.upsert(record) {
                upserts += 1;
            }
        }

        (scanned, upserts)
    }

    fn upsert(&self, record: CountRecord) -> bool {
        self.metrics.record_device_upsert();
        self.store.upsert(&record)
    }
}
