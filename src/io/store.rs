//! Count store - append/upsert log of bucketed counts
//!
//! Persistence is a JSONL log (one tagged record per line); the whole log
//! is replayed into memory at startup and reads are served from the
//! in-memory copy behind a RwLock. Appends and upserts write their line
//! synchronously in the caller's flush path. A concurrent read may or may
//! not observe an in-flight flush - only row-level atomicity is promised.

use crate::domain::types::{Alert, CountRecord, CountType, Severity, StateSample};
use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Read-path row filters; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct CountFilter {
    pub season: Option<String>,
    pub camera: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl CountFilter {
    fn matches(&self, row: &CountRecord) -> bool {
        if let Some(season) = &self.season {
            if row.season.as_deref() != Some(season.as_str()) {
                return false;
            }
        }
        if let Some(camera) = &self.camera {
            if row.camera.as_deref() != Some(camera.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if row.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if row.timestamp >= to {
                return false;
            }
        }
        true
    }
}

/// Append/upsert log of count rows plus the player state stream and
/// operational alerts. Shared by all write-path units and the read path.
pub trait CountStore: Send + Sync {
    /// Append a vehicle bucket row. Returns false if the write failed.
    fn append(&self, record: &CountRecord) -> bool;

    /// Upsert keyed by (timestamp, count_type, source); latest write wins.
    fn upsert(&self, record: &CountRecord) -> bool;

    /// Rows of one count type matching the filter, timestamp ascending
    fn query(&self, count_type: CountType, filter: &CountFilter) -> Vec<CountRecord>;

    /// Raw device_seen values at or after `since`, for the auto baseline
    fn device_readings_since(&self, since: DateTime<Utc>) -> Vec<i64>;

    fn add_state_sample(&self, sample: &StateSample) -> bool;

    /// State samples ordered by timestamp ascending
    fn state_samples(&self) -> Vec<StateSample>;

    fn latest_state_sample(&self) -> Option<StateSample>;

    /// Raise an alert unless an identical one is already active
    fn raise_alert(&self, severity: Severity, message: &str) -> bool;

    /// Deactivate all active alerts with this message
    fn resolve_alerts(&self, message: &str);

    fn active_alerts(&self) -> Vec<Alert>;
}

/// One line of the JSONL log
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum LogLine {
    Count(CountRecord),
    Upsert(CountRecord),
    State(StateSample),
    AlertRaise(Alert),
    AlertResolve { message: String },
}

#[derive(Default)]
struct StoreState {
    counts: Vec<CountRecord>,
    samples: Vec<StateSample>,
    alerts: Vec<Alert>,
}

impl StoreState {
    fn apply(&mut self, line: LogLine) {
        match line {
            LogLine::Count(record) => self.counts.push(record),
            LogLine::Upsert(record) => {
                let key = (record.timestamp, record.count_type, record.source.clone());
                match self.counts.iter_mut().find(|r| {
                    (r.timestamp, r.count_type, r.source.as_str())
                        == (key.0, key.1, key.2.as_str())
                }) {
                    Some(existing) => *existing = record,
                    None => self.counts.push(record),
                }
            }
            LogLine::State(sample) => self.samples.push(sample),
            LogLine::AlertRaise(alert) => {
                let duplicate =
                    self.alerts.iter().any(|a| a.active && a.message == alert.message);
                if !duplicate {
                    self.alerts.push(alert);
                }
            }
            LogLine::AlertResolve { message } => {
                for alert in self.alerts.iter_mut().filter(|a| a.active && a.message == message) {
                    alert.active = false;
                }
            }
        }
    }
}

/// JSONL-backed [`CountStore`]
pub struct JsonlCountStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl JsonlCountStore {
    /// Open the store, replaying any existing log. Malformed lines are
    /// skipped with a warning; a bad line never takes the store down.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut state = StoreState::default();

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read count log {}", path.display()))?;
            let mut skipped = 0usize;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<LogLine>(line) {
                    Ok(parsed) => state.apply(parsed),
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!(path = %path.display(), skipped, "count_log_lines_skipped");
            }
        }

        info!(
            path = %path.display(),
            counts = state.counts.len(),
            samples = state.samples.len(),
            "count_store_opened"
        );
        Ok(Self { path, state: RwLock::new(state) })
    }

    fn write_line(&self, line: &LogLine) -> bool {
        let json = match serde_json::to_string(line) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "count_log_serialize_failed");
                return false;
            }
        };
        match self.append_line(&json) {
            Ok(()) => true,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "count_log_write_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        debug!(path = %self.path.display(), bytes = line.len(), "count_log_written");
        Ok(())
    }
}

impl CountStore for JsonlCountStore {
    fn append(&self, record: &CountRecord) -> bool {
        self.state.write().counts.push(record.clone());
        self.write_line(&LogLine::Count(record.clone()))
    }

    fn upsert(&self, record: &CountRecord) -> bool {
        self.state.write().apply(LogLine::Upsert(record.clone()));
        self.write_line(&LogLine::Upsert(record.clone()))
    }

    fn query(&self, count_type: CountType, filter: &CountFilter) -> Vec<CountRecord> {
        let state = self.state.read();
        let mut rows: Vec<CountRecord> = state
            .counts
            .iter()
            .filter(|r| r.count_type == count_type && filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        rows
    }

    fn device_readings_since(&self, since: DateTime<Utc>) -> Vec<i64> {
        let state = self.state.read();
        state
            .counts
            .iter()
            .filter(|r| r.count_type == CountType::DeviceSeen && r.timestamp >= since)
            .map(|r| r.value)
            .collect()
    }

    fn add_state_sample(&self, sample: &StateSample) -> bool {
        self.state.write().samples.push(sample.clone());
        self.write_line(&LogLine::State(sample.clone()))
    }

    fn state_samples(&self) -> Vec<StateSample> {
        let mut samples = self.state.read().samples.clone();
        samples.sort_by_key(|s| s.timestamp);
        samples
    }

    fn latest_state_sample(&self) -> Option<StateSample> {
        self.state.read().samples.iter().max_by_key(|s| s.timestamp).cloned()
    }

    fn raise_alert(&self, severity: Severity, message: &str) -> bool {
        {
            let state = self.state.read();
            if state.alerts.iter().any(|a| a.active && a.message == message) {
                return false;
            }
        }
        let alert = Alert {
            timestamp: Utc::now(),
            severity,
            message: message.to_string(),
            active: true,
        };
        info!(severity = %severity.as_str(), message = %message, "alert_raised");
        self.state.write().apply(LogLine::AlertRaise(alert.clone()));
        self.write_line(&LogLine::AlertRaise(alert))
    }

    fn resolve_alerts(&self, message: &str) {
        let had_active = {
            let state = self.state.read();
            state.alerts.iter().any(|a| a.active && a.message == message)
        };
        if !had_active {
            return;
        }
        info!(message = %message, "alert_resolved");
        self.state.write().apply(LogLine::AlertResolve { message: message.to_string() });
        self.write_line(&LogLine::AlertResolve { message: message.to_string() });
    }

    fn active_alerts(&self) -> Vec<Alert> {
        self.state.read().alerts.iter().filter(|a| a.active).cloned().collect()
    }
}
