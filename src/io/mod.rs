//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client receiving detection frames from edge vision nodes
//! - `store` - JSONL-backed append/upsert count store
//! - `probe` - Wi-Fi probe-count CSV poller
//! - `player` - Show player status sampling and stopped alerts
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod mqtt;
pub mod player;
pub mod probe;
pub mod prometheus;
pub mod store;

// Re-export commonly used types
pub use mqtt::{run_detection_ingest, FrameRoutes};
pub use player::StatusPoller;
pub use probe::ProbePoller;
pub use store::{CountFilter, CountStore, JsonlCountStore};
