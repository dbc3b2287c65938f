//! Region of interest around the counting line, handed to the detector
//! instead of the full frame.

use nalgebra::Vector2;

use crate::tracker::CountingLine;

/// Axis-aligned crop of a frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Offset to add to crop coordinates to get frame coordinates.
    pub fn offset(&self) -> (u32, u32) {
        (self.x, self.y)
    }
}

/// Builds the detector crop around a counting line.
///
/// A gate segment of `gate_length_px`, centred on the line midpoint and
/// running along the line, is grown by `margin_px + safe_pad_px` on every
/// side and clipped to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiGate {
    pub margin_px: u32,
    /// Zero uses the line's own endpoints as the gate
    pub gate_length_px: u32,
    pub safe_pad_px: u32,
    /// Crops not larger than this in both axes fall back to the full frame
    pub min_crop_px: u32,
}

impl Default for RoiGate {
    fn default() -> Self {
        Self {
            margin_px: 120,
            gate_length_px: 480,
            safe_pad_px: 48,
            min_crop_px: 40,
        }
    }
}

impl RoiGate {
    /// Crop for a `width` x `height` frame, or `None` if detection should run
    /// on the full frame.
    pub fn crop_region(&self, width: u32, height: u32, line: &CountingLine) -> Option<CropRegion> {
        let (g1, g2) = if self.gate_length_px > 0 {
            let half = self.gate_length_px as f64 * 0.5;
            let mid = line.midpoint();
            let u = line.geometry().unit_direction();
            (truncate(mid - u * half), truncate(mid + u * half))
        } else {
            (
                (line.start.x as i64, line.start.y as i64),
                (line.end.x as i64, line.end.y as i64),
            )
        };

        let pad = self.margin_px as i64 + self.safe_pad_px as i64;
        let xmin = (g1.0.min(g2.0) - pad).max(0);
        let ymin = (g1.1.min(g2.1) - pad).max(0);
        let xmax = (g1.0.max(g2.0) + pad).min(width as i64);
        let ymax = (g1.1.max(g2.1) + pad).min(height as i64);

        let min_crop = self.min_crop_px as i64;
        if xmax - xmin > min_crop && ymax - ymin > min_crop {
            Some(CropRegion {
                x: xmin as u32,
                y: ymin as u32,
                width: (xmax - xmin) as u32,
                height: (ymax - ymin) as u32,
            })
        } else {
            None
        }
    }
}

fn truncate(v: Vector2<f64>) -> (i64, i64) {
    (v.x as i64, v.y as i64)
}
