//! Conversion of detector boxes in the common layouts into [`RawDetection`]s.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::integration::RawDetection;
use crate::tracker::ClassId;

/// Layout of a four-number box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxFormat {
    /// x1, y1, x2, y2
    #[default]
    Tlbr,
    /// centre x, centre y, width, height
    Xywh,
    /// left, top, width, height
    Tlwh,
}

impl BoxFormat {
    /// Corner form `[x1, y1, x2, y2]` of `values` in this layout.
    pub fn to_tlbr(self, [a, b, c, d]: [f32; 4]) -> [f32; 4] {
        match self {
            BoxFormat::Tlbr => [a, b, c, d],
            BoxFormat::Xywh => [a - c / 2.0, b - d / 2.0, a + c / 2.0, b + d / 2.0],
            BoxFormat::Tlwh => [a, b, a + c, b + d],
        }
    }
}

impl FromStr for BoxFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tlbr" | "xyxy" => Ok(BoxFormat::Tlbr),
            "xywh" => Ok(BoxFormat::Xywh),
            "tlwh" => Ok(BoxFormat::Tlwh),
            other => Err(format!("unknown box format `{other}` (expected tlbr, xywh or tlwh)")),
        }
    }
}

impl fmt::Display for BoxFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BoxFormat::Tlbr => "tlbr",
            BoxFormat::Xywh => "xywh",
            BoxFormat::Tlwh => "tlwh",
        })
    }
}

/// Builder for [`RawDetection`]s.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    bbox: [f32; 4],
    class_id: ClassId,
    score: f32,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the box from four values in `format`.
    pub fn bbox(mut self, format: BoxFormat, values: [f32; 4]) -> Self {
        self.bbox = format.to_tlbr(values);
        self
    }

    pub fn tlbr(self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox(BoxFormat::Tlbr, [x1, y1, x2, y2])
    }

    pub fn xywh(self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox(BoxFormat::Xywh, [cx, cy, w, h])
    }

    pub fn tlwh(self, l: f32, t: f32, w: f32, h: f32) -> Self {
        self.bbox(BoxFormat::Tlwh, [l, t, w, h])
    }

    pub fn class_id(mut self, class_id: ClassId) -> Self {
        self.class_id = class_id;
        self
    }

    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn build(self) -> RawDetection {
        RawDetection {
            bbox: self.bbox,
            class_id: self.class_id,
            score: self.score,
        }
    }
}
