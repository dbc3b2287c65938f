//! Directional line-crossing detection, at most once per track.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::tracker::counter::Counts;
use crate::tracker::geometry::{CountingLine, LineGeometry, Point};
use crate::tracker::matching::ClassId;
use crate::tracker::track_store::TrackStore;

/// Fixed slack added to the tolerance band, in pixels.
pub const BAND_SLACK_PX: f64 = 2.0;

/// Fraction of the segment length a crossing may overhang either endpoint.
pub const SEGMENT_OVERHANG: f64 = 0.1;

/// Stand-in for an exact zero signed distance.
const ZERO_EPSILON: f64 = 1e-6;

/// Side of the counting line a vehicle crossed toward.
///
/// `Up` means the motion ran against the line normal, `Down` along it. These
/// are direction labels tied to the endpoint order, not compass directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// One counted crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub track_id: u64,
    pub class_id: ClassId,
    pub direction: Direction,
    /// Path point on the far side of the line
    pub point: Point,
}

/// Tests track paths against one counting line.
#[derive(Debug, Clone, Copy)]
pub struct CrossingDetector {
    line: CountingLine,
    geometry: LineGeometry,
}

impl CrossingDetector {
    pub fn new(line: CountingLine) -> Self {
        Self {
            geometry: line.geometry(),
            line,
        }
    }

    pub fn line(&self) -> &CountingLine {
        &self.line
    }

    /// Decide whether the step `prev -> now` crosses the line, and which way.
    pub fn evaluate_segment(&self, prev: Point, now: Point) -> Option<Direction> {
        let prev_v = Vector2::from(prev);
        let now_v = Vector2::from(now);

        let d_prev = self.geometry.signed_distance(prev_v);
        let d_now = self.geometry.signed_distance(now_v);
        // A point exactly on the line takes the side opposite its partner, so
        // landing on or leaving the line is a side change. Sliding along the
        // line (both zero) is not.
        let (d_prev, d_now) = match (d_prev == 0.0, d_now == 0.0) {
            (true, true) => return None,
            (true, false) => (-d_now.signum() * ZERO_EPSILON, d_now),
            (false, true) => (d_prev, -d_prev.signum() * ZERO_EPSILON),
            (false, false) => (d_prev, d_now),
        };

        if d_prev.signum() == d_now.signum() {
            return None;
        }

        if d_prev.abs().min(d_now.abs()) > self.line.band_px + BAND_SLACK_PX {
            return None;
        }

        let t_mid = self.geometry.projection((prev_v + now_v) * 0.5);
        if !(-SEGMENT_OVERHANG..=1.0 + SEGMENT_OVERHANG).contains(&t_mid) {
            return None;
        }

        let mut dot = (now_v - prev_v).dot(&self.geometry.normal());
        if self.line.invert_direction {
            dot = -dot;
        }
        Some(if dot < 0.0 {
            Direction::Up
        } else {
            Direction::Down
        })
    }

    /// Evaluate every uncounted track's latest step; count and mark crossings.
    pub fn check(&self, store: &mut TrackStore, counts: &mut Counts) -> Vec<CrossingEvent> {
        if self.line.is_degenerate() {
            debug!(
                x = self.line.start.x,
                y = self.line.start.y,
                "counting line has zero length; crossings are not evaluated"
            );
            return Vec::new();
        }

        let mut events = Vec::new();
        for track in store.iter_mut() {
            if track.is_counted() {
                continue;
            }
            let Some((prev, now)) = track.last_segment() else {
                continue;
            };
            let Some(direction) = self.evaluate_segment(prev, now) else {
                continue;
            };

            track.mark_counted();
            counts.record(track.class_id, direction);
            info!(
                track_id = track.track_id,
                class_id = track.class_id,
                ?direction,
                "line crossed"
            );
            events.push(CrossingEvent {
                track_id: track.track_id,
                class_id: track.class_id,
                direction,
                point: now,
            });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> CrossingDetector {
        CrossingDetector::new(CountingLine::new(Point::new(100, 300), Point::new(500, 300)))
    }

    #[test]
    fn test_downward_crossing() {
        let det = detector();
        assert_eq!(
            det.evaluate_segment(Point::new(300, 292), Point::new(300, 304)),
            Some(Direction::Down)
        );
        assert_eq!(
            det.evaluate_segment(Point::new(300, 304), Point::new(300, 292)),
            Some(Direction::Up)
        );
    }

    #[test]
    fn test_same_side_is_not_a_crossing() {
        let det = detector();
        assert_eq!(det.evaluate_segment(Point::new(300, 280), Point::new(300, 292)), None);
        assert_eq!(det.evaluate_segment(Point::new(300, 310), Point::new(300, 330)), None);
    }

    #[test]
    fn test_band_boundary_is_inclusive() {
        let det = detector();
        // min(|-14|, |+15|) == 12 + 2
        assert!(det.evaluate_segment(Point::new(300, 286), Point::new(300, 315)).is_some());
        // min(|-15|, |+16|) == 15
        assert!(det.evaluate_segment(Point::new(300, 285), Point::new(300, 316)).is_none());
    }

    #[test]
    fn test_segment_overhang() {
        let det = detector();
        // t = (60 - 100) / 400 = -0.1
        assert!(det.evaluate_segment(Point::new(60, 295), Point::new(60, 305)).is_some());
        assert!(det.evaluate_segment(Point::new(59, 295), Point::new(59, 305)).is_none());
        // t = (540 - 100) / 400 = 1.1
        assert!(det.evaluate_segment(Point::new(540, 295), Point::new(540, 305)).is_some());
        assert!(det.evaluate_segment(Point::new(541, 295), Point::new(541, 305)).is_none());
    }

    #[test]
    fn test_touching_the_line() {
        let det = detector();
        // Landing exactly on the line counts as crossing it.
        assert_eq!(
            det.evaluate_segment(Point::new(300, 290), Point::new(300, 300)),
            Some(Direction::Down)
        );
        // So does leaving it.
        assert_eq!(
            det.evaluate_segment(Point::new(300, 300), Point::new(300, 290)),
            Some(Direction::Up)
        );
        // Standing still or sliding along the line does not.
        assert_eq!(det.evaluate_segment(Point::new(300, 300), Point::new(300, 300)), None);
        assert_eq!(det.evaluate_segment(Point::new(200, 300), Point::new(250, 300)), None);
    }

    #[test]
    fn test_stationary_track_never_crosses() {
        let det = detector();
        assert_eq!(det.evaluate_segment(Point::new(300, 299), Point::new(300, 299)), None);
    }

    #[test]
    fn test_invert_direction_flips_both() {
        let line = CountingLine::new(Point::new(100, 300), Point::new(500, 300))
            .with_invert_direction(true);
        let det = CrossingDetector::new(line);
        assert_eq!(
            det.evaluate_segment(Point::new(300, 292), Point::new(300, 304)),
            Some(Direction::Up)
        );
        assert_eq!(
            det.evaluate_segment(Point::new(300, 304), Point::new(300, 292)),
            Some(Direction::Down)
        );
    }

    #[test]
    fn test_diagonal_line_follows_normal() {
        // Normal of (0,0)->(200,200) is (-1, 1)/sqrt(2).
        let det = CrossingDetector::new(
            CountingLine::new(Point::new(0, 0), Point::new(200, 200)).with_band(20.0),
        );
        assert_eq!(
            det.evaluate_segment(Point::new(105, 95), Point::new(95, 105)),
            Some(Direction::Down)
        );
        assert_eq!(
            det.evaluate_segment(Point::new(95, 105), Point::new(105, 95)),
            Some(Direction::Up)
        );
    }

    #[test]
    fn test_vertical_line() {
        // Directed top to bottom, the normal points to -x.
        let det = CrossingDetector::new(CountingLine::new(Point::new(400, 0), Point::new(400, 600)));
        assert_eq!(
            det.evaluate_segment(Point::new(395, 300), Point::new(405, 300)),
            Some(Direction::Up)
        );
    }
}
