//! CountingPipeline for combining detection with tracking and counting.

use std::collections::BTreeSet;

use image::{RgbImage, imageops};
use tracing::warn;

use crate::config::Settings;
use crate::error::Result;
use crate::integration::roi::{CropRegion, RoiGate};
use crate::integration::{DetectionSource, RawDetection};
use crate::tracker::{ClassId, CountingLine, Counts, CrossingEvent, Detection, LineTracker, TrackSnapshot};

/// Which detector outputs are handed to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFilter {
    /// `None` accepts every class
    pub classes: Option<BTreeSet<ClassId>>,
    pub min_confidence: f32,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl DetectionFilter {
    pub fn all() -> Self {
        Self {
            classes: None,
            min_confidence: 0.0,
        }
    }

    pub fn classes(classes: impl IntoIterator<Item = ClassId>, min_confidence: f32) -> Self {
        Self {
            classes: Some(classes.into_iter().collect()),
            min_confidence,
        }
    }

    pub fn accepts(&self, detection: &RawDetection) -> bool {
        detection.score >= self.min_confidence
            && self
                .classes
                .as_ref()
                .is_none_or(|c| c.contains(&detection.class_id))
    }
}

/// Outcome of one processed frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// The detector ran on this frame
    pub detected: bool,
    /// Detections handed to the tracker
    pub detections: usize,
    /// Region the detector saw, `None` for the full frame
    pub crop: Option<CropRegion>,
    /// Boxes to draw: the tracked detections, or every class when the
    /// pipeline reports all classes
    pub overlay: Vec<Detection>,
    /// Crossings counted on this frame
    pub events: Vec<CrossingEvent>,
    /// The counters were zeroed since the previous frame
    pub counts_reset: bool,
}

impl FrameReport {
    /// The counters differ from the previous frame's.
    pub fn counts_changed(&self) -> bool {
        self.counts_reset || !self.events.is_empty()
    }
}

/// Runs detection on a stride, tracks, and counts crossings of one line.
///
/// Frames between detection frames keep the last tracking state; the line is
/// still checked on them.
pub struct CountingPipeline<D: DetectionSource> {
    detector: D,
    tracker: LineTracker,
    gate: Option<RoiGate>,
    filter: DetectionFilter,
    overlay_all_classes: bool,
    line: Option<CountingLine>,
    detection_stride: u32,
    frame_index: u64,
    counts_reset: bool,
}

impl<D: DetectionSource> CountingPipeline<D> {
    /// Detect on every full frame, track every class.
    pub fn new(detector: D, tracker: LineTracker) -> Self {
        Self {
            detector,
            tracker,
            gate: None,
            filter: DetectionFilter::all(),
            overlay_all_classes: false,
            line: None,
            detection_stride: 1,
            frame_index: 0,
            counts_reset: false,
        }
    }

    /// Build a pipeline from validated settings. The line is left unset.
    ///
    /// Only the configured vehicle classes are tracked, whatever the display
    /// mode.
    pub fn from_settings(detector: D, settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let tracker = LineTracker::with_classes(settings.tracker_config(), settings.classes.ids());
        let filter = DetectionFilter::classes(settings.classes.ids(), settings.runtime.detection_confidence);
        Ok(Self::new(detector, tracker)
            .with_gate(settings.gate())
            .with_filter(filter)
            .with_overlay_all_classes(settings.runtime.show_all_classes)
            .with_stride(settings.detection_stride()))
    }

    pub fn with_gate(mut self, gate: Option<RoiGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_filter(mut self, filter: DetectionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Put every detected class in [`FrameReport::overlay`], not only the
    /// tracked ones. Tracking is unaffected.
    pub fn with_overlay_all_classes(mut self, all: bool) -> Self {
        self.overlay_all_classes = all;
        self
    }

    /// Run the detector on every `stride`th frame (0 is treated as 1).
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.detection_stride = stride.max(1);
        self
    }

    pub fn with_line(mut self, line: CountingLine) -> Self {
        self.set_line(Some(line));
        self
    }

    /// Replace or clear the counting line. Counters and counted tracks are kept.
    pub fn set_line(&mut self, line: Option<CountingLine>) {
        if line.as_ref().is_some_and(CountingLine::is_degenerate) {
            warn!("counting line has zero length; nothing will be counted");
        }
        self.line = line;
    }

    pub fn line(&self) -> Option<&CountingLine> {
        self.line.as_ref()
    }

    /// Process a single frame.
    ///
    /// On detection frames the detector runs on the ROI crop (or the full
    /// frame). Boxes that pass the filter and the size check are mapped back to
    /// frame coordinates and fed to the tracker. A detector error leaves the
    /// frame counter unchanged, so the next frame retries detection.
    pub fn process_frame(&mut self, frame: &RgbImage) -> std::result::Result<FrameReport, D::Error> {
        let frame_index = self.frame_index;
        let mut report = FrameReport {
            frame_index,
            detected: frame_index % self.detection_stride as u64 == 0,
            ..FrameReport::default()
        };

        if report.detected {
            let (width, height) = frame.dimensions();
            let crop = match (&self.gate, &self.line) {
                (Some(gate), Some(line)) => gate.crop_region(width, height, line),
                _ => None,
            };

            let raw = match crop {
                Some(c) => {
                    let view = imageops::crop_imm(frame, c.x, c.y, c.width, c.height).to_image();
                    self.detector.detect(&view)?
                }
                None => self.detector.detect(frame)?,
            };

            let offset = crop.map(|c| c.offset()).unwrap_or((0, 0));
            let min_size = self.tracker.config().min_detection_size;
            let detections: Vec<Detection> = raw
                .iter()
                .filter(|d| self.filter.accepts(d) && d.is_larger_than(min_size))
                .filter_map(|d| d.to_detection(offset, width, height))
                .collect();

            report.overlay = if self.overlay_all_classes {
                raw.iter()
                    .filter(|d| d.score >= self.filter.min_confidence)
                    .filter_map(|d| d.to_detection(offset, width, height))
                    .collect()
            } else {
                detections.clone()
            };
            report.detections = detections.len();
            report.crop = crop;
            self.tracker.update_prefiltered(detections);
        }

        if let Some(line) = &self.line {
            report.events = self.tracker.check_line_crossings(line);
        }
        report.counts_reset = std::mem::take(&mut self.counts_reset);

        self.frame_index += 1;
        Ok(report)
    }

    pub fn counts(&self) -> Counts {
        self.tracker.counts()
    }

    pub fn tracks(&self) -> Vec<TrackSnapshot> {
        self.tracker.tracks()
    }

    /// Zero the counters. The next report flags the change.
    pub fn reset_counts(&mut self) {
        self.tracker.reset_counts();
        self.counts_reset = true;
    }

    /// Get a reference to the underlying detector.
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Get a mutable reference to the underlying detector.
    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Get a reference to the underlying tracker.
    pub fn tracker(&self) -> &LineTracker {
        &self.tracker
    }
}
