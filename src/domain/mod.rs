//! Domain models - core business types and time math
//!
//! This module contains the canonical data types used throughout the system:
//! - `Track` / `CrossingEvent` - tracked objects and tripline crossings
//! - `CountRecord` - persisted bucketed count rows
//! - `Season` / `ShowWindow` - the show calendar and active-hours windows
//! - `timewin` - local-wall-clock bucket math shared by write and read paths

pub mod season;
pub mod timewin;
pub mod types;
