//! A single tracked vehicle and its centroid history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::tracker::geometry::Point;
use crate::tracker::matching::{ClassId, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Number of centroids kept per track before the oldest is dropped.
pub const DEFAULT_PATH_CAPACITY: usize = 64;

/// Persistent identity of one vehicle across frames.
#[derive(Debug, Clone)]
pub struct Track {
    /// Unique, never reused identifier
    pub track_id: u64,
    /// Last observed (or predicted) bounding box
    pub bbox: Rect,
    /// Last observed detector class
    pub class_id: ClassId,
    /// Last observed detection score
    pub confidence: f32,
    /// Frames since the last matched detection
    pub age: u32,
    /// Consecutive frames without a match, bounds prediction
    pub missed: u32,
    state: TrackState,
    path: VecDeque<Point>,
    path_capacity: usize,
}

impl Track {
    /// Start a track from a detection; the path begins at its centroid.
    pub fn new(track_id: u64, detection: &Detection, path_capacity: usize) -> Self {
        let path_capacity = path_capacity.max(2);
        let mut path = VecDeque::with_capacity(path_capacity);
        path.push_back(detection.bbox.centroid());
        Self {
            track_id,
            bbox: detection.bbox,
            class_id: detection.class_id,
            confidence: detection.confidence,
            age: 0,
            missed: 0,
            state: TrackState::Active,
            path,
            path_capacity,
        }
    }

    /// Take over a matched detection.
    pub fn refresh(&mut self, detection: &Detection) {
        self.bbox = detection.bbox;
        self.class_id = detection.class_id;
        self.confidence = detection.confidence;
        self.age = 0;
        self.missed = 0;
        self.push_point(detection.bbox.centroid());
    }

    /// Record a frame in which no detection matched this track.
    pub fn mark_missed(&mut self) {
        self.missed += 1;
    }

    pub fn push_point(&mut self, point: Point) {
        if self.path.len() == self.path_capacity {
            self.path.pop_front();
        }
        self.path.push_back(point);
    }

    pub fn path(&self) -> &VecDeque<Point> {
        &self.path
    }

    pub fn centroid(&self) -> Point {
        self.bbox.centroid()
    }

    /// Most recent path point. A live track always has one.
    pub fn last_point(&self) -> Point {
        self.path.back().copied().unwrap_or_else(|| self.centroid())
    }

    /// The previous and the current path point, if the path has two.
    pub fn last_segment(&self) -> Option<(Point, Point)> {
        let n = self.path.len();
        if n < 2 {
            return None;
        }
        Some((self.path[n - 2], self.path[n - 1]))
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn is_counted(&self) -> bool {
        self.state == TrackState::Counted
    }

    pub fn mark_counted(&mut self) {
        self.state = TrackState::Counted;
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            track_id: self.track_id,
            bbox: self.bbox,
            class_id: self.class_id,
            confidence: self.confidence,
            path: self.path.iter().copied().collect(),
            is_counted: self.is_counted(),
            age: self.age,
            missed: self.missed,
        }
    }
}

/// Read-only copy of a track for overlay rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub track_id: u64,
    pub bbox: Rect,
    pub class_id: ClassId,
    pub confidence: f32,
    /// Centroids, oldest first
    pub path: Vec<Point>,
    pub is_counted: bool,
    pub age: u32,
    pub missed: u32,
}
