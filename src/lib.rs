//! Directional line-crossing counter for tracked vehicles.
//!
//! The [`tracker`] module holds the per-frame engine: centroid association,
//! occlusion prediction, eviction and crossing detection against a
//! [`CountingLine`]. The [`integration`] module connects it to an external
//! detector and frame source and runs it on a worker thread.

pub mod config;
pub mod error;
pub mod integration;
pub mod tracker;

pub use config::Settings;
pub use error::{Error, Result};
pub use integration::{
    BoxFormat, CountingPipeline, DetectionBuilder, DetectionSource, FrameReport, FrameSlot, FrameSource,
    PublishedFrame, RawDetection, RoiGate, Session,
};
pub use tracker::{
    ClassId, Counts, CountingLine, CrossingEvent, Detection, Direction, LineTracker, LineType,
    Point, Rect, TrackSnapshot, TrackerConfig,
};
