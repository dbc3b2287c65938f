//! Per-frame tracking and counting loop.

use std::collections::HashSet;

use crate::tracker::counter::Counts;
use crate::tracker::crossing::{CrossingDetector, CrossingEvent};
use crate::tracker::geometry::CountingLine;
use crate::tracker::matching::{self, Association, ClassId, Detection};
use crate::tracker::predictor::OcclusionPredictor;
use crate::tracker::rect::Rect;
use crate::tracker::track::{DEFAULT_PATH_CAPACITY, TrackSnapshot};
use crate::tracker::track_store::TrackStore;

/// Configuration for the LineTracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Largest centroid jump, in pixels, still matched to the same track
    pub max_match_distance: f64,
    /// Frames a track may go unmatched before it is evicted
    pub max_track_lost_frames: u32,
    /// Detections must be strictly wider and taller than this
    pub min_detection_size: i32,
    pub path_capacity: usize,
    pub predict_missing: bool,
    pub max_prediction_frames: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_match_distance: 80.0,
            max_track_lost_frames: 15,
            min_detection_size: 20,
            path_capacity: DEFAULT_PATH_CAPACITY,
            predict_missing: false,
            max_prediction_frames: 1,
        }
    }
}

/// What one call to [`LineTracker::update`] did to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameUpdate {
    pub matched: Vec<u64>,
    pub created: Vec<u64>,
    pub predicted: Vec<u64>,
    pub evicted: Vec<u64>,
}

pub struct LineTracker {
    store: TrackStore,
    predictor: OcclusionPredictor,
    counts: Counts,
    config: TrackerConfig,
    frame_id: u64,
}

impl LineTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_classes(config, [])
    }

    /// A tracker whose counters start with a zero entry for each class.
    pub fn with_classes(config: TrackerConfig, classes: impl IntoIterator<Item = ClassId>) -> Self {
        Self {
            store: TrackStore::new(config.path_capacity),
            predictor: OcclusionPredictor::new(config.predict_missing, config.max_prediction_frames),
            counts: Counts::with_classes(classes),
            config,
            frame_id: 0,
        }
    }

    /// Feed one frame of detections: associate, create, predict, age and evict.
    pub fn update(&mut self, detections: Vec<Detection>) -> FrameUpdate {
        let detections = matching::filter_detections(detections, self.config.min_detection_size);
        self.track(detections)
    }

    /// Like [`LineTracker::update`], for detections whose size was already
    /// checked before they were clamped into the frame. Only empty boxes are
    /// dropped here.
    pub fn update_prefiltered(&mut self, detections: Vec<Detection>) -> FrameUpdate {
        let detections = matching::filter_detections(detections, 0);
        self.track(detections)
    }

    fn track(&mut self, detections: Vec<Detection>) -> FrameUpdate {
        self.frame_id += 1;
        let mut outcome = FrameUpdate::default();

        let Association {
            matches,
            unmatched_detections,
            unmatched_tracks,
        } = matching::associate(&self.store, &detections, self.config.max_match_distance);

        // Tracks seen this frame, matched or newly created. Local to this pass.
        let mut seen = HashSet::with_capacity(matches.len() + unmatched_detections.len());

        for (track_id, idet) in matches {
            self.store.refresh(track_id, &detections[idet]);
            seen.insert(track_id);
            outcome.matched.push(track_id);
        }

        for idet in unmatched_detections {
            let track_id = self.store.create(&detections[idet]);
            seen.insert(track_id);
            outcome.created.push(track_id);
        }

        for track_id in unmatched_tracks {
            let Some(track) = self.store.get_mut(track_id) else {
                continue;
            };
            track.mark_missed();
            if self.predictor.predict_missing(track) {
                outcome.predicted.push(track_id);
            }
        }

        outcome.evicted = self
            .store
            .advance_age_and_evict(&seen, self.config.max_track_lost_frames);
        outcome
    }

    /// Count every live, uncounted track whose latest step crosses `line`.
    pub fn check_line_crossings(&mut self, line: &CountingLine) -> Vec<CrossingEvent> {
        CrossingDetector::new(*line).check(&mut self.store, &mut self.counts)
    }

    /// Snapshot of the live tracks, in id order.
    pub fn tracks(&self) -> Vec<TrackSnapshot> {
        self.store.get_all()
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    /// Copy of the current counters.
    pub fn counts(&self) -> Counts {
        self.counts.clone()
    }

    /// Zero the counters. Tracks already counted stay counted.
    pub fn reset_counts(&mut self) {
        self.counts.reset();
    }

    /// Live track whose box overlaps `bbox` best, if the IoU reaches `min_iou`.
    pub fn track_id_for(&self, bbox: &Rect, min_iou: f64) -> Option<u64> {
        self.store
            .iter()
            .map(|t| (t.track_id, t.bbox.iou(bbox)))
            .filter(|&(_, iou)| iou > 0.0 && iou >= min_iou)
            .fold(None, |best: Option<(u64, f64)>, cand| match best {
                Some((_, best_iou)) if best_iou >= cand.1 => best,
                _ => Some(cand),
            })
            .map(|(id, _)| id)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Number of update calls so far.
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::geometry::Point;

    fn car_at(x: i32, y: i32) -> Detection {
        Detection::new(Rect::around(Point::new(x, y), 20), 2, 0.9)
    }

    #[test]
    fn test_new_detections_become_tracks() {
        let mut tracker = LineTracker::new(TrackerConfig::default());
        let outcome = tracker.update(vec![car_at(100, 100), car_at(400, 100)]);
        assert_eq!(outcome.created, vec![1, 2]);
        assert!(outcome.matched.is_empty());
        assert_eq!(tracker.tracks().len(), 2);
    }

    #[test]
    fn test_small_detections_are_ignored() {
        let mut tracker = LineTracker::new(TrackerConfig::default());
        tracker.update(vec![Detection::from_tlbr(0, 0, 15, 60, 2, 0.9)]);
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn test_prefiltered_update_keeps_clamped_edge_boxes() {
        let edge = Detection::from_tlbr(0, 100, 15, 140, 2, 0.9);

        let mut tracker = LineTracker::new(TrackerConfig::default());
        tracker.update(vec![edge.clone()]);
        assert!(tracker.tracks().is_empty());

        let outcome = tracker.update_prefiltered(vec![edge, Detection::from_tlbr(50, 50, 50, 90, 2, 0.9)]);
        assert_eq!(outcome.created, vec![1]);
        assert_eq!(tracker.tracks().len(), 1);
    }

    #[test]
    fn test_prediction_bridges_one_missed_frame() {
        let config = TrackerConfig {
            predict_missing: true,
            ..TrackerConfig::default()
        };
        let mut tracker = LineTracker::new(config);
        tracker.update(vec![car_at(100, 100)]);
        tracker.update(vec![car_at(100, 110)]);

        let outcome = tracker.update(vec![]);
        assert_eq!(outcome.predicted, vec![1]);
        let snap = &tracker.tracks()[0];
        assert_eq!(snap.path.last(), Some(&Point::new(100, 120)));
        assert_eq!((snap.age, snap.missed), (1, 1));

        let outcome = tracker.update(vec![]);
        assert!(outcome.predicted.is_empty());
        assert_eq!(tracker.tracks()[0].path.len(), 3);
    }

    #[test]
    fn test_track_id_for_uses_iou() {
        let mut tracker = LineTracker::new(TrackerConfig::default());
        tracker.update(vec![car_at(100, 100), car_at(300, 100)]);
        let query = Rect::around(Point::new(305, 100), 20);
        assert_eq!(tracker.track_id_for(&query, 0.1), Some(2));
        assert_eq!(tracker.track_id_for(&Rect::new(0, 500, 10, 510), 0.1), None);
    }

    #[test]
    fn test_reset_counts_keeps_counted_flags() {
        let mut tracker = LineTracker::with_classes(TrackerConfig::default(), [2]);
        let line = CountingLine::new(Point::new(0, 300), Point::new(600, 300));
        tracker.update(vec![car_at(300, 295)]);
        tracker.update(vec![car_at(300, 305)]);
        assert_eq!(tracker.check_line_crossings(&line).len(), 1);

        tracker.reset_counts();
        assert_eq!(tracker.counts(), Counts::with_classes([2]));
        assert!(tracker.tracks()[0].is_counted);
        assert!(tracker.check_line_crossings(&line).is_empty());
    }
}
