//! Prometheus metrics HTTP endpoint
//!
//! Exposes monitor counters in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Format all counters in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, site: &str) -> String {
    let mut output = String::with_capacity(2048);

    write_metric(
        &mut output,
        "glowsync_frames_total",
        "Detection frames received",
        MetricType::Counter,
        site,
        summary.frames_total,
    );
    write_metric(
        &mut output,
        "glowsync_frames_gated_total",
        "Frames skipped outside the show window",
        MetricType::Counter,
        site,
        summary.frames_gated,
    );
    write_metric(
        &mut output,
        "glowsync_frames_dropped_total",
        "Frames shed by channel backpressure",
        MetricType::Counter,
        site,
        summary.frames_dropped,
    );
    write_metric(
        &mut output,
        "glowsync_frame_parse_failures_total",
        "Detection frames that failed to parse",
        MetricType::Counter,
        site,
        summary.frame_parse_failures,
    );
    write_metric(
        &mut output,
        "glowsync_crossings_total",
        "Tripline crossings counted",
        MetricType::Counter,
        site,
        summary.crossings_total,
    );
    write_metric(
        &mut output,
        "glowsync_buckets_flushed_total",
        "Vehicle buckets flushed to the store",
        MetricType::Counter,
        site,
        summary.buckets_flushed,
    );
    write_metric(
        &mut output,
        "glowsync_device_upserts_total",
        "Device rows upserted",
        MetricType::Counter,
        site,
        summary.device_upserts,
    );
    write_metric(
        &mut output,
        "glowsync_probe_polls_total",
        "Probe CSV polls completed",
        MetricType::Counter,
        site,
        summary.probe_polls,
    );
    write_metric(
        &mut output,
        "glowsync_status_samples_total",
        "Player state samples stored",
        MetricType::Counter,
        site,
        summary.status_samples,
    );

    let _ = writeln!(output, "# HELP glowsync_frames_per_sec Detection frames per second");
    let _ = writeln!(output, "# TYPE glowsync_frames_per_sec gauge");
    let _ = writeln!(output, "glowsync_frames_per_sec{{site=\"{site}\"}} {:.2}", summary.frames_per_sec);

    output
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let summary = metrics.report();
            let body = format_prometheus_metrics(&summary, &site_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
