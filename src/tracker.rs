mod counter;
mod crossing;
mod geometry;
mod line_tracker;
mod matching;
mod predictor;
mod rect;
mod track;
mod track_state;
mod track_store;

pub use counter::{Counts, LabelledCounts};
pub use crossing::{BAND_SLACK_PX, CrossingDetector, CrossingEvent, Direction, SEGMENT_OVERHANG};
pub use geometry::{CountingLine, DEFAULT_BAND_PX, LineGeometry, LineType, Point};
pub use line_tracker::{FrameUpdate, LineTracker, TrackerConfig};
pub use matching::{
    Association, AssignmentResult, ClassId, Detection, associate, centroid_distance,
    filter_detections, greedy_assignment,
};
pub use predictor::OcclusionPredictor;
pub use rect::Rect;
pub use track::{DEFAULT_PATH_CAPACITY, Track, TrackSnapshot};
pub use track_state::TrackState;
pub use track_store::TrackStore;
