//! Integration tests for configuration loading

use glowsync::infra::{BaselineMode, Config};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "test-show"
timezone = "America/New_York"

[storage]
path = "/tmp/test-counts.jsonl"

[mqtt]
host = "test-host"
port = 1884
detections_topic = "show/detections"

[broker]
enabled = false

[probe]
url = "http://probe.local/export.csv"
poll_interval_secs = 120
baseline_mode = "auto"
baseline = 3

[player]
url = "http://player.local"

[metrics]
interval_secs = 15
prometheus_port = 9091

[[seasons]]
name = "christmas"
start_date = "2025-11-20T00:00:00Z"
end_date = "2026-01-05T00:00:00Z"
show_start = "17:00"
show_end = "23:00"
bucket_minutes = 5

[[cameras]]
name = "entrance"
tripline = [[400.0, 0.0], [400.0, 720.0]]
roi = [[0.0, 100.0], [1280.0, 100.0], [1280.0, 600.0], [0.0, 600.0]]

[[cameras]]
name = "exit"
tripline = [[900.0, 0.0], [900.0, 720.0]]
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-show");
    assert_eq!(config.timezone_name(), "America/New_York");
    assert_eq!(config.tz(), chrono_tz::America::New_York);
    assert_eq!(config.storage_path(), "/tmp/test-counts.jsonl");
    assert_eq!(config.mqtt_host(), "test-host");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.detections_topic(), "show/detections");
    assert!(!config.broker_enabled());
    assert_eq!(config.probe_url(), Some("http://probe.local/export.csv"));
    assert_eq!(config.probe_poll_interval_secs(), 120);
    assert_eq!(config.baseline_mode(), BaselineMode::Auto);
    assert_eq!(config.manual_baseline(), 3);
    assert_eq!(config.player_url(), Some("http://player.local"));
    assert_eq!(config.prometheus_port(), 9091);

    assert_eq!(config.seasons().len(), 1);
    let season = &config.seasons()[0];
    assert_eq!(season.name, "christmas");
    assert_eq!(season.bucket_minutes, 5);

    assert_eq!(config.cameras().len(), 2);
    assert_eq!(config.cameras()[0].name, "entrance");
    assert!(config.cameras()[0].tripline().is_some());
    assert_eq!(config.cameras()[1].roi_points().len(), 0);
}

#[test]
fn test_season_defaults_applied() {
    let mut temp_file = NamedTempFile::new().unwrap();
    let config_content = r#"
[[seasons]]
name = "minimal"
start_date = "2025-11-20T00:00:00Z"
end_date = "2026-01-05T00:00:00Z"
"#;
    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    let season = &config.seasons()[0];
    assert_eq!(season.show_start, "17:00");
    assert_eq!(season.show_end, "23:00");
    assert_eq!(season.bucket_minutes, 1);
}

#[test]
fn test_invalid_timezone_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[site]\ntimezone = \"Mars/Olympus\"\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.site_id(), "glowsync");
}
