//! Per-camera object tracking and tripline crossing detection
//!
//! Converts per-frame blob centroids into discrete crossing events:
//! - filter detections to the camera's region of interest
//! - associate detections to existing tracks (greedy nearest neighbor)
//! - detect tripline crossings on matched tracks
//!
//! The association step is a deliberately simple heuristic kept behind the
//! `Associator` trait so it can be replaced (e.g. by a bipartite matcher)
//! without touching the crossing or bucketing logic.

use crate::domain::types::{CrossingEvent, Point, Track, TrackId};
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use tracing::debug;

/// Maximum squared match distance between a track and a detection (50 px)
pub const MATCH_RADIUS_SQ: f64 = 2500.0;

/// Matches existing tracks to fresh detections.
///
/// Returns, for each track in order, the index of the detection it claims
/// (or None). A detection index must not be claimed twice.
pub trait Associator: Send {
    fn associate(&self, tracks: &[Track], detections: &[Point]) -> Vec<Option<usize>>;
}

/// Greedy nearest-neighbor association. Tracks claim detections in
/// insertion order; a contested detection goes to the first track
/// processed. Not a minimum-cost matching.
#[derive(Debug, Clone, Copy)]
pub struct GreedyNearest {
    pub radius_sq: f64,
}

impl Default for GreedyNearest {
    fn default() -> Self {
        Self { radius_sq: MATCH_RADIUS_SQ }
    }
}

impl Associator for GreedyNearest {
    fn associate(&self, tracks: &[Track], detections: &[Point]) -> Vec<Option<usize>> {
        let mut claimed = vec![false; detections.len()];
        tracks
            .iter()
            .map(|track| {
                let mut best: Option<usize> = None;
                let mut best_d = f64::INFINITY;
                for (i, pt) in detections.iter().enumerate() {
                    if claimed[i] {
                        continue;
                    }
                    let d = track.pos.dist_sq(pt);
                    if d < best_d {
                        best_d = d;
                        best = Some(i);
                    }
                }
                match best {
                    Some(i) if best_d < self.radius_sq => {
                        claimed[i] = true;
                        Some(i)
                    }
                    _ => None,
                }
            })
            .collect()
    }
}

/// Directed two-point tripline segment in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tripline {
    pub a: Point,
    pub b: Point,
}

impl Tripline {
    pub fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    /// Signed cross product of p against the directed segment
    #[inline]
    fn side(&self, p: Point) -> f64 {
        (self.b.y - self.a.y) * (p.x - self.a.x) - (self.b.x - self.a.x) * (p.y - self.a.y)
    }

    /// A strict sign flip means the motion crossed the infinite line
    /// containing the segment. This is intentionally not a bounded
    /// segment-intersection test; counting behavior depends on it.
    pub fn crossed(&self, prev: Point, curr: Point) -> bool {
        self.side(prev) * self.side(curr) < 0.0
    }
}

/// Region-of-interest polygon; detections outside it are ignored.
/// Fewer than three vertices means unconstrained.
#[derive(Debug, Clone, Default)]
pub struct RoiPolygon {
    vertices: Vec<Point>,
}

impl RoiPolygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// Ray-cast containment test
    pub fn contains(&self, p: Point) -> bool {
        if self.vertices.len() < 3 {
            return true;
        }
        let mut inside = false;
        let mut j = self.vertices.len() - 1;
        for i in 0..self.vertices.len() {
            let (vi, vj) = (self.vertices[i], self.vertices[j]);
            if (vi.y > p.y) != (vj.y > p.y)
                && p.x < (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Tracks moving blobs for one camera and emits a crossing event the first
/// time each track crosses the tripline.
///
/// Owned exclusively by one camera unit; track IDs are unique within the
/// tracker's lifetime. Tracks unmatched for a single frame are dropped -
/// there is no persistence across detection gaps.
pub struct ObjectTracker {
    camera: String,
    tripline: Option<Tripline>,
    roi: RoiPolygon,
    associator: Box<dyn Associator>,
    tracks: Vec<Track>,
    next_id: u64,
}

impl ObjectTracker {
    pub fn new(camera: &str, tripline: Option<Tripline>, roi: RoiPolygon) -> Self {
        Self {
            camera: camera.to_string(),
            tripline,
            roi,
            associator: Box::new(GreedyNearest::default()),
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Swap the association strategy
    #[allow(dead_code)]
    pub fn with_associator(mut self, associator: Box<dyn Associator>) -> Self {
        self.associator = associator;
        self
    }

    /// Advance one frame: filter, associate, detect crossings, spawn and
    /// drop tracks. Emits at most one event per track lifetime.
    pub fn step(&mut self, detections: &[Point], now: DateTime<Utc>) -> SmallVec<[CrossingEvent; 2]> {
        let detections: Vec<Point> =
            detections.iter().copied().filter(|p| self.roi.contains(*p)).collect();

        let assignment = self.associator.associate(&self.tracks, &detections);

        let mut events = SmallVec::new();
        let mut claimed = vec![false; detections.len()];
        let mut survivors = Vec::with_capacity(self.tracks.len() + detections.len());

        for (track, slot) in self.tracks.iter().zip(assignment.iter()) {
            // Unmatched tracks are dropped; a reacquired object starts over
            let Some(i) = *slot else { continue };
            claimed[i] = true;

            let prev = track.pos;
            let curr = detections[i];
            let mut track = Track { id: track.id, pos: curr, counted: track.counted };

            if !track.counted {
                if let Some(line) = self.tripline {
                    if line.crossed(prev, curr) {
                        track.counted = true;
                        debug!(camera = %self.camera, track_id = %track.id, "tripline_crossed");
                        events.push(CrossingEvent {
                            timestamp: now,
                            camera: self.camera.clone(),
                        });
                    }
                }
            }
            survivors.push(track);
        }

        for (i, pt) in detections.iter().enumerate() {
            if claimed[i] {
                continue;
            }
            survivors.push(Track { id: TrackId(self.next_id), pos: *pt, counted: false });
            self.next_id += 1;
        }

        self.tracks = survivors;
        events
    }

    /// Number of tracks alive after the last frame
    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2025-12-01T23:30:00Z".parse().unwrap()
    }

    fn pt(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    /// Vertical tripline at x=50, from y=0 down to y=100
    fn vertical_line() -> Tripline {
        Tripline::new(pt(50.0, 0.0), pt(50.0, 100.0))
    }

    fn tracker() -> ObjectTracker {
        ObjectTracker::new("cam", Some(vertical_line()), RoiPolygon::default())
    }

    #[test]
    fn test_crossing_counted_once_per_track_lifetime() {
        let mut t = tracker();

        t.step(&[pt(40.0, 50.0)], now());
        let events = t.step(&[pt(60.0, 50.0)], now());
        assert_eq!(events.len(), 1);

        // Crossing back does not count again
        let events = t.step(&[pt(40.0, 50.0)], now());
        assert!(events.is_empty());
        let events = t.step(&[pt(60.0, 50.0)], now());
        assert!(events.is_empty());
        assert_eq!(t.active_tracks(), 1);
    }

    #[test]
    fn test_crossing_on_infinite_line_beyond_segment() {
        // The test is against the containing infinite line, so motion far
        // below the segment's extent still counts.
        let mut t = tracker();
        t.step(&[pt(40.0, 500.0)], now());
        let events = t.step(&[pt(60.0, 500.0)], now());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_no_crossing_without_sign_flip() {
        let mut t = tracker();
        t.step(&[pt(10.0, 50.0)], now());
        let events = t.step(&[pt(45.0, 50.0)], now());
        assert!(events.is_empty());
    }

    #[test]
    fn test_no_tripline_never_counts() {
        let mut t = ObjectTracker::new("cam", None, RoiPolygon::default());
        t.step(&[pt(40.0, 50.0)], now());
        let events = t.step(&[pt(60.0, 50.0)], now());
        assert!(events.is_empty());
    }

    #[test]
    fn test_unmatched_track_dropped_and_reacquired_as_new() {
        let mut t = tracker();
        t.step(&[pt(40.0, 50.0)], now());
        assert_eq!(t.active_tracks(), 1);

        // One empty frame drops the track
        t.step(&[], now());
        assert_eq!(t.active_tracks(), 0);

        // Reappearing on the far side spawns a fresh uncounted track,
        // so no crossing is observed
        let events = t.step(&[pt(60.0, 50.0)], now());
        assert!(events.is_empty());
        assert_eq!(t.active_tracks(), 1);
    }

    #[test]
    fn test_detection_outside_match_radius_spawns_new_track() {
        let mut t = tracker();
        t.step(&[pt(40.0, 50.0)], now());
        // 60 px jump exceeds the 50 px radius: old track drops, new one spawns
        let events = t.step(&[pt(100.0, 50.0)], now());
        assert!(events.is_empty());
        assert_eq!(t.active_tracks(), 1);
    }

    #[test]
    fn test_greedy_first_track_wins_contested_detection() {
        let tracks = vec![
            Track { id: TrackId(1), pos: pt(0.0, 0.0), counted: false },
            Track { id: TrackId(2), pos: pt(10.0, 0.0), counted: false },
        ];
        // Single detection closer to track 2, but track 1 is processed
        // first and claims it anyway
        let detections = vec![pt(8.0, 0.0)];
        let assignment = GreedyNearest::default().associate(&tracks, &detections);
        assert_eq!(assignment, vec![Some(0), None]);
    }

    #[test]
    fn test_greedy_each_track_claims_nearest_unclaimed() {
        let tracks = vec![
            Track { id: TrackId(1), pos: pt(0.0, 0.0), counted: false },
            Track { id: TrackId(2), pos: pt(100.0, 0.0), counted: false },
        ];
        let detections = vec![pt(102.0, 0.0), pt(3.0, 0.0)];
        let assignment = GreedyNearest::default().associate(&tracks, &detections);
        assert_eq!(assignment, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_roi_filters_detections_before_association() {
        let roi = RoiPolygon::new(vec![pt(0.0, 0.0), pt(100.0, 0.0), pt(100.0, 100.0), pt(0.0, 100.0)]);
        let mut t = ObjectTracker::new("cam", Some(vertical_line()), roi);

        // Outside the ROI: ignored entirely
        t.step(&[pt(200.0, 200.0)], now());
        assert_eq!(t.active_tracks(), 0);

        t.step(&[pt(40.0, 50.0)], now());
        let events = t.step(&[pt(60.0, 50.0)], now());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_roi_point_in_polygon() {
        let roi = RoiPolygon::new(vec![pt(0.0, 0.0), pt(10.0, 0.0), pt(10.0, 10.0), pt(0.0, 10.0)]);
        assert!(roi.contains(pt(5.0, 5.0)));
        assert!(!roi.contains(pt(15.0, 5.0)));
        assert!(!roi.contains(pt(-1.0, 5.0)));

        // Degenerate polygon accepts everything
        assert!(RoiPolygon::new(vec![pt(0.0, 0.0)]).contains(pt(999.0, 999.0)));
    }

    #[test]
    fn test_track_ids_unique_over_lifetime() {
        let mut t = tracker();
        t.step(&[pt(10.0, 10.0)], now());
        t.step(&[], now());
        t.step(&[pt(10.0, 10.0)], now());
        // Two generations, two distinct ids
        assert_eq!(t.tracks[0].id, TrackId(2));
    }
}
