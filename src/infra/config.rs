//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::season::Season;
use crate::domain::types::Point;
use crate::services::tracker::{RoiPolygon, Tripline};
use anyhow::Context;
use chrono_tz::Tz;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// How the device-seen noise floor is chosen
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineMode {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id(), timezone: default_timezone() }
    }
}

fn default_site_id() -> String {
    "glowsync".to_string()
}

fn default_timezone() -> String {
    "America/Chicago".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_storage_path() }
    }
}

fn default_storage_path() -> String {
    "data/counts.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Topic prefix; frames arrive on `<prefix>/<camera>`
    #[serde(default = "default_detections_topic")]
    pub detections_topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            detections_topic: default_detections_topic(),
            username: None,
            password: None,
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_detections_topic() -> String {
    "glowsync/detections".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_enabled")]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: default_broker_enabled(),
            bind_address: default_broker_bind_address(),
            port: default_mqtt_port(),
        }
    }
}

fn default_broker_enabled() -> bool {
    true
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// CSV export URL; empty disables the probe poller
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_probe_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_baseline_mode")]
    pub baseline_mode: BaselineMode,
    /// Manual noise floor, also the fallback when auto has no data
    #[serde(default)]
    pub baseline: i64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            poll_interval_secs: default_probe_poll_interval(),
            baseline_mode: default_baseline_mode(),
            baseline: 0,
        }
    }
}

fn default_probe_poll_interval() -> u64 {
    300
}

fn default_baseline_mode() -> BaselineMode {
    BaselineMode::Manual
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerConfig {
    /// Player base URL (e.g. "http://192.168.1.30"); empty disables polling
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_player_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self { url: String::new(), poll_interval_secs: default_player_poll_interval() }
    }
}

fn default_player_poll_interval() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: default_prometheus_port() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9090
}

/// One monitored camera. Tripline and ROI are in pixel coordinates of the
/// edge node's frames.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    /// Directed two-point tripline; anything else disables counting
    #[serde(default)]
    pub tripline: Vec<[f64; 2]>,
    /// Optional region-of-interest polygon
    #[serde(default)]
    pub roi: Vec<[f64; 2]>,
}

impl CameraConfig {
    pub fn tripline(&self) -> Option<Tripline> {
        match self.tripline.as_slice() {
            [a, b] => Some(Tripline::new(Point::new(a[0], a[1]), Point::new(b[0], b[1]))),
            _ => None,
        }
    }

    pub fn roi_points(&self) -> Vec<Point> {
        self.roi.iter().map(|p| Point::new(p[0], p[1])).collect()
    }

    pub fn roi_polygon(&self) -> RoiPolygon {
        RoiPolygon::new(self.roi_points())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    tz: Tz,
    timezone_name: String,
    storage_path: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    detections_topic: String,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    probe_url: String,
    probe_poll_interval_secs: u64,
    baseline_mode: BaselineMode,
    manual_baseline: i64,
    player_url: String,
    player_poll_interval_secs: u64,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    seasons: Vec<Season>,
    cameras: Vec<CameraConfig>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            tz: chrono_tz::America::Chicago,
            timezone_name: default_timezone(),
            storage_path: default_storage_path(),
            mqtt_host: default_mqtt_host(),
            mqtt_port: default_mqtt_port(),
            mqtt_username: None,
            mqtt_password: None,
            detections_topic: default_detections_topic(),
            broker_enabled: true,
            broker_bind_address: default_broker_bind_address(),
            broker_port: default_mqtt_port(),
            probe_url: String::new(),
            probe_poll_interval_secs: default_probe_poll_interval(),
            baseline_mode: BaselineMode::Manual,
            manual_baseline: 0,
            player_url: String::new(),
            player_poll_interval_secs: default_player_poll_interval(),
            metrics_interval_secs: default_metrics_interval(),
            prometheus_port: default_prometheus_port(),
            seasons: Vec::new(),
            cameras: Vec::new(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let tz: Tz = toml_config
            .site
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid timezone {}: {e}", toml_config.site.timezone))?;

        Ok(Self {
            site_id: toml_config.site.id,
            tz,
            timezone_name: toml_config.site.timezone,
            storage_path: toml_config.storage.path,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            detections_topic: toml_config.mqtt.detections_topic,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            probe_url: toml_config.probe.url,
            probe_poll_interval_secs: toml_config.probe.poll_interval_secs,
            baseline_mode: toml_config.probe.baseline_mode,
            manual_baseline: toml_config.probe.baseline,
            player_url: toml_config.player.url,
            player_poll_interval_secs: toml_config.player.poll_interval_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            seasons: toml_config.seasons,
            cameras: toml_config.cameras,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn timezone_name(&self) -> &str {
        &self.timezone_name
    }

    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn detections_topic(&self) -> &str {
        &self.detections_topic
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    /// Probe CSV URL; None when unconfigured
    pub fn probe_url(&self) -> Option<&str> {
        let url = self.probe_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn probe_poll_interval_secs(&self) -> u64 {
        self.probe_poll_interval_secs
    }

    pub fn baseline_mode(&self) -> BaselineMode {
        self.baseline_mode
    }

    pub fn manual_baseline(&self) -> i64 {
        self.manual_baseline
    }

    /// Player base URL; None when unconfigured
    pub fn player_url(&self) -> Option<&str> {
        let url = self.player_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn player_poll_interval_secs(&self) -> u64 {
        self.player_poll_interval_secs
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn seasons(&self) -> &[Season] {
        &self.seasons
    }

    pub fn cameras(&self) -> &[CameraConfig] {
        &self.cameras
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
