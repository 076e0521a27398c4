//! Shared types for the show monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source tag for counts produced by the camera tripline pipeline
pub const SOURCE_TRIPLINE: &str = "tripline";
/// Source tag for counts produced by the Wi-Fi probe poller
pub const SOURCE_PROBE: &str = "probe";

/// Newtype wrapper for track IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Detection centroid in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared euclidean distance to another point
    #[inline]
    pub fn dist_sq(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }
}

/// One tracked object within a single tracker instance.
///
/// `counted` transitions false -> true at most once over the track's
/// lifetime; a dropped-and-reacquired object becomes a new track.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub pos: Point,
    pub counted: bool,
}

/// Emitted when a tracked object crosses a camera's tripline.
/// Ephemeral - consumed immediately by the bucket accumulator.
#[derive(Debug, Clone)]
pub struct CrossingEvent {
    pub timestamp: DateTime<Utc>,
    pub camera: String,
}

/// Count category for stored rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountType {
    Vehicle,
    DeviceSeen,
}

impl CountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountType::Vehicle => "vehicle",
            CountType::DeviceSeen => "device_seen",
        }
    }
}

impl std::str::FromStr for CountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vehicle" => Ok(CountType::Vehicle),
            "device_seen" => Ok(CountType::DeviceSeen),
            other => Err(format!("unknown count type: {other}")),
        }
    }
}

/// Persisted count row. Vehicle rows are append-only; device_seen rows are
/// upserted by (timestamp, count_type, source) with the latest value winning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountRecord {
    /// Bucket-aligned UTC instant
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    pub count_type: CountType,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
}

/// One sample of the show player's discrete state (now-playing media).
/// Used only as the secondary stream for correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSample {
    pub timestamp: DateTime<Utc>,
    pub label: String,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

/// Operational alert (e.g. player stopped during show hours)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub active: bool,
}

/// One per-frame detection batch published by an edge vision node.
/// Frame capture and blob extraction happen on the edge; only centroids
/// cross the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionFrame {
    #[serde(default)]
    pub camera: Option<String>,
    /// Capture instant; frames without one are stamped at receipt
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub points: Vec<Point>,
}
