//! Constant-velocity extrapolation for tracks that missed a detection.

use crate::tracker::track::Track;

/// Bridges short detector dropouts by extending a track along its last motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcclusionPredictor {
    enabled: bool,
    max_prediction_frames: u32,
}

impl Default for OcclusionPredictor {
    fn default() -> Self {
        Self::disabled()
    }
}

impl OcclusionPredictor {
    pub fn new(enabled: bool, max_prediction_frames: u32) -> Self {
        Self {
            enabled,
            max_prediction_frames,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 1)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Extrapolate an unmatched track by one frame.
    ///
    /// Call after [`Track::mark_missed`]. Within the horizon, a track with two
    /// or more path points is shifted (box and a new path point) by the last
    /// displacement; a single-point track repeats its point. Returns true if a
    /// path point was added.
    pub fn predict_missing(&self, track: &mut Track) -> bool {
        if !self.enabled || track.missed > self.max_prediction_frames {
            return false;
        }

        match track.last_segment() {
            Some((prev, last)) => {
                let (vx, vy) = (last.x - prev.x, last.y - prev.y);
                track.bbox = track.bbox.translate(vx, vy);
                track.push_point(last.translate(vx, vy));
            }
            None => {
                let last = track.last_point();
                track.push_point(last);
            }
        }
        true
    }
}
