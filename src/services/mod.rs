//! Services - tracking, bucketing, and aggregation logic
//!
//! - `tracker` - per-camera blob tracking and tripline crossing detection
//! - `accumulator` - show-hours gating and time-bucket accumulation
//! - `aggregator` - read-side series building, baseline, correlation
//! - `unit` - per-camera concurrency unit wiring the three together

pub mod accumulator;
pub mod aggregator;
pub mod tracker;
pub mod unit;

// Re-export commonly used types
pub use accumulator::BucketAccumulator;
pub use tracker::ObjectTracker;
pub use unit::CameraUnit;
