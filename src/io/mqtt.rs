//! MQTT client for receiving edge detection frames
//!
//! Edge vision nodes run capture and background subtraction locally and
//! publish one JSON message per frame to `<prefix>/<camera>`. This client
//! subscribes to the whole prefix and routes each frame to the matching
//! camera unit's channel. Frames are forwarded with try_send so a slow
//! unit sheds load instead of stalling the event loop.

use crate::domain::types::DetectionFrame;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Per-camera frame senders, keyed by camera name
pub type FrameRoutes = FxHashMap<String, mpsc::Sender<DetectionFrame>>;

/// Run the detection ingest client, reconnecting on failure until
/// shutdown is signaled.
pub async fn run_detection_ingest(
    config: Config,
    routes: FrameRoutes,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if let Err(e) = ingest_loop(&config, &routes, &metrics, &mut shutdown).await {
            warn!(error = %e, "detection_ingest_error");
        }
        if *shutdown.borrow() {
            return;
        }
        warn!("detection_ingest_reconnecting");
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

async fn ingest_loop(
    config: &Config,
    routes: &FrameRoutes,
    metrics: &Metrics,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mqttoptions =
        MqttOptions::new("glowsync-ingest", config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    let filter = format!("{}/#", config.detections_topic());
    client.subscribe(filter.as_str(), QoS::AtMostOnce).await?;

    info!(
        topic = %filter,
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        cameras = routes.len(),
        "detection_ingest_subscribed"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("detection_ingest_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        route_frame(&publish.topic, &publish.payload, routes, metrics);
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(host = %config.mqtt_host(), "detection_ingest_connected");
                    }
                    Ok(_) => {}
                    Err(e) => return Err(Box::new(e)),
                }
            }
        }
    }
}

/// Route one published frame to its camera unit. The camera is the last
/// topic segment; the frame's own camera field, when present, must agree.
fn route_frame(topic: &str, payload: &[u8], routes: &FrameRoutes, metrics: &Metrics) {
    let camera = topic.rsplit('/').next().unwrap_or_default();

    let Some(tx) = routes.get(camera) else {
        debug!(topic = %topic, "frame_for_unconfigured_camera");
        return;
    };

    let frame = match serde_json::from_slice::<DetectionFrame>(payload) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(camera = %camera, error = %e, "detection_frame_parse_failed");
            metrics.record_frame_parse_failure();
            return;
        }
    };

    if let Some(declared) = frame.camera.as_deref() {
        if declared != camera {
            warn!(topic = %topic, declared = %declared, "detection_frame_camera_mismatch");
            return;
        }
    }

    if tx.try_send(frame).is_err() {
        metrics.record_frame_dropped();
        debug!(camera = %camera, "detection_frame_dropped_backpressure");
    }
}
