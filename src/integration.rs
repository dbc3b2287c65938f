//! Integration of the tracker with detection backends, frame sources and a
//! worker thread.
//!
//! The detector and the frame source are external collaborators: implement
//! [`DetectionSource`] and [`FrameSource`] for them, then drive a
//! [`CountingPipeline`] directly or hand both to a [`Session`].

mod builder;
mod detector;
mod pipeline;
mod roi;
mod worker;

pub use builder::{BoxFormat, DetectionBuilder};
pub use detector::{DetectionSource, RawDetection};
pub use pipeline::{CountingPipeline, DetectionFilter, FrameReport};
pub use roi::{CropRegion, RoiGate};
pub use worker::{FrameSlot, FrameSource, PublishedFrame, Session};
