//! Glowsync - outdoor light-show traffic monitor
//!
//! Turns raw sensor signal (camera motion blobs, Wi-Fi probe counts) into
//! a historical time-series of vehicle passes and visitor devices seen,
//! gated to the show's active hours and season.
//!
//! Module structure:
//! - `domain/` - Core types (counts, seasons, bucket time math)
//! - `io/` - External interfaces (MQTT ingest, store, probe, player)
//! - `services/` - Tracking, bucketing, aggregation logic
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use clap::Parser;
use glowsync::domain::season::SeasonContext;
use glowsync::infra::{Config, Metrics};
use glowsync::io::{run_detection_ingest, FrameRoutes, JsonlCountStore, ProbePoller, StatusPoller};
use glowsync::services::CameraUnit;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Bound on each camera's frame channel; full means frames are shed
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Glowsync - light-show traffic monitor
#[derive(Parser, Debug)]
#[command(name = "glowsync", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("glowsync starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    if config.broker_enabled() {
        glowsync::infra::broker::start_embedded_broker(&config);
    }

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        timezone = %config.timezone_name(),
        storage = %config.storage_path(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        detections_topic = %config.detections_topic(),
        cameras = config.cameras().len(),
        seasons = config.seasons().len(),
        probe = config.probe_url().is_some(),
        player = config.player_url().is_some(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Shared, read-only collaborators
    let store = Arc::new(JsonlCountStore::open(config.storage_path())?);
    let seasons = Arc::new(SeasonContext::new(config.seasons().to_vec()));
    let metrics = Arc::new(Metrics::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // One isolated tracker/accumulator pair per camera, fed by a bounded
    // channel; no mutable state is shared across units
    let mut routes = FrameRoutes::default();
    let mut unit_handles = Vec::new();
    for cam in config.cameras() {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        routes.insert(cam.name.clone(), frame_tx);

        let unit =
            CameraUnit::from_config(cam, &seasons, config.tz(), store.clone(), metrics.clone());
        let unit_shutdown = shutdown_rx.clone();
        unit_handles.push(tokio::spawn(async move {
            unit.run(frame_rx, unit_shutdown).await;
        }));
    }

    // MQTT ingest feeding the camera units
    if !routes.is_empty() {
        let ingest_config = config.clone();
        let ingest_metrics = metrics.clone();
        let ingest_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            run_detection_ingest(ingest_config, routes, ingest_metrics, ingest_shutdown).await;
        });
    }

    // Wi-Fi probe poller (device_seen write path)
    if let Some(poller) =
        ProbePoller::from_config(&config, &seasons, store.clone(), metrics.clone())
    {
        let probe_shutdown = shutdown_rx.clone();
        unit_handles.push(tokio::spawn(async move {
            poller.run(probe_shutdown).await;
        }));
    }

    // Player status sampling (secondary stream + stopped alert)
    if let Some(poller) =
        StatusPoller::from_config(&config, seasons.clone(), store.clone(), metrics.clone())
    {
        let status_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            poller.run(status_shutdown).await;
        });
    }

    // Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = glowsync::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "prometheus_metrics_server_error");
            }
        });
    }

    // Periodic metrics summary log
    let reporter_metrics = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            reporter_metrics.report().log();
        }
    });

    // Wait for Ctrl+C, then broadcast shutdown and let the write-path
    // units finish their final flush
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    for handle in unit_handles {
        let _ = handle.await;
    }

    info!("glowsync shutdown complete");
    Ok(())
}
