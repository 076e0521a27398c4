//! Show player status sampling
//!
//! Polls the light-show player's HTTP API for its now-playing state and
//! stores one state sample per poll; the samples are the secondary stream
//! the read path correlates vehicle counts against. Also raises an alert
//! when the player sits stopped during show hours, and resolves it once
//! playback resumes.

use crate::domain::season::SeasonContext;
use crate::domain::timewin;
use crate::domain::types::{Severity, StateSample};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::store::CountStore;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Status endpoints across player API generations, newest first
const STATUS_PATHS: &[&str] = &[
    "/api/system/status",
    "/api/fppd/status",
    "/fppjson.php?command=getFPPDstatus",
    "/fppjson.php?command=getStatus",
];

/// States that count as the show actually running
const PLAYING_STATES: &[&str] = &["playing", "play", "running"];

const STOPPED_ALERT: &str = "player appears stopped during show hours";

const FETCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Merged now-playing details
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerStatus {
    pub state: Option<String>,
    pub playlist: Option<String>,
    pub media: Option<String>,
    pub hostname: Option<String>,
    pub version: Option<String>,
}

impl PlayerStatus {
    fn is_empty(&self) -> bool {
        self == &PlayerStatus::default()
    }

    fn is_playing(&self) -> bool {
        let state = self.state.as_deref().unwrap_or_default().to_ascii_lowercase();
        PLAYING_STATES.contains(&state.as_str())
    }
}

/// Fold one status payload into the merged view. Field names drifted
/// across player versions, so every known spelling is tried.
fn merge_status(json: &serde_json::Value, into: &mut PlayerStatus) {
    let get = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .filter_map(|k| json.get(*k))
            .find_map(|v| match v {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    };

    if let Some(state) = get(&["state", "fppd_state", "statusName", "status_name"]) {
        into.state = Some(state);
    }
    if let Some(playlist) = get(&["current_playlist", "CurrentPlaylist", "playlist", "playlistName"]) {
        into.playlist = Some(playlist);
    }
    if let Some(media) = get(&["media", "sequence", "current_sequence", "song"]) {
        into.media = Some(media);
    }
    if let Some(hostname) = get(&["hostname", "HostName"]) {
        into.hostname = Some(hostname);
    }
    if let Some(version) = get(&["version", "fpp_version"]) {
        into.version = Some(version);
    }
}

/// Polls the player and writes state samples plus stopped alerts
pub struct StatusPoller {
    base_url: String,
    poll_interval: Duration,
    tz: Tz,
    seasons: Arc<SeasonContext>,
    store: Arc<dyn CountStore>,
    metrics: Arc<Metrics>,
    client: reqwest::Client,
}

impl StatusPoller {
    /// Build the poller, or None when no player URL is configured
    pub fn from_config(
        config: &Config,
        seasons: Arc<SeasonContext>,
        store: Arc<dyn CountStore>,
        metrics: Arc<Metrics>,
    ) -> Option<Self> {
        let base_url = config.player_url()?.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();

        Some(Self {
            base_url,
            poll_interval: Duration::from_secs(config.player_poll_interval_secs()),
            tz: config.tz(),
            seasons,
            store,
            metrics,
            client,
        })
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            url = %self.base_url,
            interval_secs = self.poll_interval.as_secs(),
            "status_poller_started"
        );
        let mut ticker = interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_once().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("status_poller_stopped");
    }

    async fn poll_once(&self) {
        let status = self.fetch_status().await;
        if status.is_empty() {
            debug!(url = %self.base_url, "player_status_unavailable");
            return;
        }

        let now = Utc::now();
        let label = status.media.clone().or_else(|| status.playlist.clone()).unwrap_or_default();
        self.store.add_state_sample(&StateSample { timestamp: now, label });
        self.metrics.record_status_sample();

        self.check_alert(&status, now);
    }

    /// Try every known status path and merge whatever responds
    async fn fetch_status(&self) -> PlayerStatus {
        let mut status = PlayerStatus::default();
        for path in STATUS_PATHS {
            let url = format!("{}{}", self.base_url, path);
            let response = match self.client.get(&url).send().await {
                Ok(r) if r.status().as_u16() < 500 => r,
                Ok(_) => continue,
                Err(e) => {
                    debug!(url = %url, error = %e, "player_status_request_failed");
                    continue;
                }
            };
            match response.json::<serde_json::Value>().await {
                Ok(json) => merge_status(&json, &mut status),
                Err(_) => continue,
            }
        }
        status
    }

    /// Alerting is gated to show hours of the season containing `now`;
    /// with no season configured the window is always open.
    fn check_alert(&self, status: &PlayerStatus, now: DateTime<Utc>) {
        if status.is_playing() {
            self.store.resolve_alerts(STOPPED_ALERT);
            return;
        }

        let window = SeasonContext::window_for(self.seasons.resolve(now));
        if !window.contains(timewin::local_time_of_day(now, self.tz)) {
            return;
        }

        warn!(state = ?status.state, "player_not_playing_in_show_hours");
        self.store.raise_alert(Severity::Error, STOPPED_ALERT);
    }
}
