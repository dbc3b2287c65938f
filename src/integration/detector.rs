//! Trait for object detection inference backends.

use image::RgbImage;

use crate::tracker::{ClassId, Detection, Rect};

/// Trait for object detection inference backends.
///
/// Implement this trait to connect any detection model to the counter. The
/// model itself is a black box: it receives an image (the full frame or a
/// crop around the counting line) and returns boxes in that image's
/// coordinates.
///
/// # Example
///
/// ```ignore
/// use linecount_rs::{DetectionSource, RawDetection};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, image: &image::RgbImage) -> Result<Vec<RawDetection>, Self::Error> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error;

    /// Run inference on an RGB image and return its detections.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<RawDetection>, Self::Error>;
}

/// Detector output, in the coordinates of the image the detector saw.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Bounding box: [x1, y1, x2, y2]
    pub bbox: [f32; 4],
    pub class_id: ClassId,
    /// Confidence score
    pub score: f32,
}

impl RawDetection {
    /// Both sides strictly longer than `min_size`, measured on the box as the
    /// detector returned it, before any clamping into the frame.
    pub fn is_larger_than(&self, min_size: i32) -> bool {
        let [x1, y1, x2, y2] = self.bbox;
        let min = min_size as f32;
        x2 - x1 > min && y2 - y1 > min
    }

    /// Convert to a full-frame [`Detection`].
    ///
    /// Adds the crop `offset`, truncates to integer pixels and clamps into a
    /// `width` x `height` frame. Boxes with non-finite coordinates are dropped.
    pub fn to_detection(&self, offset: (u32, u32), width: u32, height: u32) -> Option<Detection> {
        if !self.bbox.iter().all(|v| v.is_finite()) {
            return None;
        }
        let (ox, oy) = (offset.0 as f32, offset.1 as f32);
        let [x1, y1, x2, y2] = self.bbox;
        let bbox = Rect::new(
            (x1 + ox) as i32,
            (y1 + oy) as i32,
            (x2 + ox) as i32,
            (y2 + oy) as i32,
        )
        .clamp_to(width, height);
        Some(Detection::new(bbox, self.class_id, self.score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_truncate() {
        let raw = RawDetection {
            bbox: [10.7, 20.2, 50.9, 80.5],
            class_id: 2,
            score: 0.8,
        };
        let det = raw.to_detection((100, 200), 1280, 720).unwrap();
        assert_eq!(det.bbox, Rect::new(110, 220, 150, 280));
        assert_eq!(det.class_id, 2);
    }

    #[test]
    fn test_clamped_into_frame() {
        let raw = RawDetection {
            bbox: [-5.0, 600.0, 100.0, 800.0],
            class_id: 3,
            score: 0.5,
        };
        let det = raw.to_detection((0, 0), 640, 720).unwrap();
        assert_eq!(det.bbox, Rect::new(0, 600, 100, 719));
    }

    #[test]
    fn test_size_is_measured_before_clamping() {
        // Partly left of the frame: 25px wide as detected, 15px once clamped.
        let raw = RawDetection {
            bbox: [-10.0, 100.0, 15.0, 140.0],
            class_id: 2,
            score: 0.9,
        };
        assert!(raw.is_larger_than(20));
        let det = raw.to_detection((0, 0), 640, 480).unwrap();
        assert_eq!(det.bbox.width(), 15);
        assert!(!raw.is_larger_than(25));
    }

    #[test]
    fn test_nan_coordinates_are_dropped() {
        let raw = RawDetection {
            bbox: [f32::NAN, 0.0, 10.0, 10.0],
            class_id: 2,
            score: 0.9,
        };
        assert!(raw.to_detection((0, 0), 640, 480).is_none());
    }
}
