//! Greedy nearest-centroid association of detections to live tracks.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::tracker::geometry::Point;
use crate::tracker::rect::Rect;
use crate::tracker::track_store::TrackStore;

/// Detector class label. Opaque to the tracker; only used to bucket counters.
pub type ClassId = u32;

/// Detection input for the tracker, in full-frame coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box in TLBR format (x1, y1, x2, y2)
    pub bbox: Rect,
    pub class_id: ClassId,
    /// Detection confidence score
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: Rect, class_id: ClassId, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
        }
    }

    pub fn from_tlbr(x1: i32, y1: i32, x2: i32, y2: i32, class_id: ClassId, confidence: f32) -> Self {
        Self::new(Rect::new(x1, y1, x2, y2), class_id, confidence)
    }

    pub fn centroid(&self) -> Point {
        self.bbox.centroid()
    }

    /// Both sides strictly larger than `min_size` and a finite score.
    pub fn is_trackable(&self, min_size: i32) -> bool {
        self.bbox.width() > min_size && self.bbox.height() > min_size && self.confidence.is_finite()
    }
}

/// Drop noise detections (too small, zero-area or non-finite) before association.
pub fn filter_detections(detections: Vec<Detection>, min_size: i32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.is_trackable(min_size.max(0)))
        .collect()
}

/// Compute the Euclidean centroid distance matrix, shape (tracks, detections).
pub fn centroid_distance(track_centroids: &[Point], det_centroids: &[Point]) -> Array2<f64> {
    let mut dists = Array2::zeros((track_centroids.len(), det_centroids.len()));
    for (i, t) in track_centroids.iter().enumerate() {
        for (j, d) in det_centroids.iter().enumerate() {
            dists[[i, j]] = t.distance(*d);
        }
    }
    dists
}

/// Row/column indices produced by [`greedy_assignment`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    /// (track row, detection column)
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Assign each detection, in column order, to the nearest unclaimed track
/// within `max_distance`.
///
/// Ties go to the lower row index. A track is claimed at most once. This is not
/// a globally optimal assignment: an earlier detection may take a track that a
/// later one is closer to.
pub fn greedy_assignment(cost_matrix: &Array2<f64>, max_distance: f64) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    let mut claimed = vec![false; num_rows];
    let mut matches = Vec::new();
    let mut unmatched_detections = Vec::new();

    for col in 0..num_cols {
        let mut best: Option<(usize, f64)> = None;
        for row in 0..num_rows {
            if claimed[row] {
                continue;
            }
            let dist = cost_matrix[[row, col]];
            if dist <= max_distance && best.is_none_or(|(_, best_dist)| dist < best_dist) {
                best = Some((row, dist));
            }
        }
        match best {
            Some((row, _)) => {
                claimed[row] = true;
                matches.push((row, col));
            }
            None => unmatched_detections.push(col),
        }
    }

    let unmatched_tracks = claimed
        .iter()
        .enumerate()
        .filter_map(|(i, &c)| if c { None } else { Some(i) })
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

/// Association of one frame's detections against the live tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Association {
    /// (track id, detection index)
    pub matches: Vec<(u64, usize)>,
    pub unmatched_detections: Vec<usize>,
    pub unmatched_tracks: Vec<u64>,
}

/// Match detections to the tracks in `store`, in track id order.
pub fn associate(store: &TrackStore, detections: &[Detection], max_match_distance: f64) -> Association {
    let track_ids: Vec<u64> = store.ids().collect();
    let track_centroids: Vec<Point> = store.iter().map(|t| t.centroid()).collect();
    let det_centroids: Vec<Point> = detections.iter().map(Detection::centroid).collect();

    let dists = centroid_distance(&track_centroids, &det_centroids);
    let AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    } = greedy_assignment(&dists, max_match_distance);

    Association {
        matches: matches
            .into_iter()
            .map(|(row, col)| (track_ids[row], col))
            .collect(),
        unmatched_detections,
        unmatched_tracks: unmatched_tracks.into_iter().map(|row| track_ids[row]).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_greedy_prefers_nearest_within_radius() {
        let cost = array![[10.0, 90.0], [5.0, 30.0]];
        let res = greedy_assignment(&cost, 80.0);
        // Detection 0 claims track 1 (5 < 10); detection 1 falls to track 0 at 90 > 80.
        assert_eq!(res.matches, vec![(1, 0)]);
        assert_eq!(res.unmatched_detections, vec![1]);
        assert_eq!(res.unmatched_tracks, vec![0]);
    }

    #[test]
    fn test_greedy_follows_detection_order() {
        // Both detections are closest to track 0; the first one wins it.
        let cost = array![[20.0, 1.0], [40.0, 50.0]];
        let res = greedy_assignment(&cost, 80.0);
        assert_eq!(res.matches, vec![(0, 0), (1, 1)]);
        assert!(res.unmatched_tracks.is_empty());
    }

    #[test]
    fn test_greedy_tie_goes_to_first_track() {
        let cost = array![[10.0], [10.0]];
        let res = greedy_assignment(&cost, 80.0);
        assert_eq!(res.matches, vec![(0, 0)]);
        assert_eq!(res.unmatched_tracks, vec![1]);
    }

    #[test]
    fn test_distance_cap_is_inclusive() {
        let cost = array![[80.0]];
        assert_eq!(greedy_assignment(&cost, 80.0).matches, vec![(0, 0)]);
        let cost = array![[80.5]];
        assert!(greedy_assignment(&cost, 80.0).matches.is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        let res = greedy_assignment(&Array2::zeros((0, 3)), 80.0);
        assert_eq!(res.unmatched_detections, vec![0, 1, 2]);
        let res = greedy_assignment(&Array2::zeros((2, 0)), 80.0);
        assert_eq!(res.unmatched_tracks, vec![0, 1]);
    }

    #[test]
    fn test_centroid_distance() {
        let d = centroid_distance(&[Point::new(0, 0)], &[Point::new(3, 4), Point::new(0, 0)]);
        assert_eq!(d[[0, 0]], 5.0);
        assert_eq!(d[[0, 1]], 0.0);
    }

    #[test]
    fn test_filter_detections() {
        let dets = vec![
            Detection::from_tlbr(0, 0, 40, 40, 2, 0.9),
            Detection::from_tlbr(0, 0, 20, 40, 2, 0.9),
            Detection::from_tlbr(10, 10, 10, 10, 2, 0.9),
            Detection::from_tlbr(0, 0, 40, 40, 2, f32::NAN),
        ];
        let kept = filter_detections(dets, 20);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bbox, Rect::new(0, 0, 40, 40));
    }
}
