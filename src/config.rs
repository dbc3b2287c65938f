//! Persistent settings, loaded from and saved to a JSON file.
//!
//! Every section is `#[serde(default)]`, so a file only needs the keys it
//! changes; everything else keeps its default.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::integration::RoiGate;
use crate::tracker::{
    ClassId, CountingLine, DEFAULT_BAND_PX, DEFAULT_PATH_CAPACITY, LineType, Point, TrackerConfig,
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tracking: TrackingSettings,
    pub prediction: PredictionSettings,
    pub line: LineSettings,
    pub roi: RoiSettings,
    pub runtime: RuntimeSettings,
    pub classes: ClassNames,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    pub min_detection_size: i32,
    pub max_track_lost_frames: u32,
    pub max_match_distance: f64,
    pub path_capacity: usize,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            min_detection_size: 20,
            max_track_lost_frames: 15,
            max_match_distance: 80.0,
            path_capacity: DEFAULT_PATH_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionSettings {
    pub enabled: bool,
    pub max_prediction_frames: u32,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_prediction_frames: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSettings {
    pub line_type: LineType,
    pub band_px: f64,
    pub invert_direction: bool,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            line_type: LineType::Manual,
            band_px: DEFAULT_BAND_PX,
            invert_direction: false,
        }
    }
}

impl LineSettings {
    /// A counting line between two drawn endpoints, with these band and direction settings.
    pub fn line(&self, start: Point, end: Point) -> CountingLine {
        CountingLine::new(start, end)
            .with_band(self.band_px)
            .with_invert_direction(self.invert_direction)
    }

    /// The automatic line for a frame size, unless the line type is manual.
    pub fn auto_line(&self, width: u32, height: u32) -> Option<CountingLine> {
        CountingLine::auto(self.line_type, width, height).map(|l| self.line(l.start, l.end))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiSettings {
    pub enabled: bool,
    pub margin_px: u32,
    pub gate_length_px: u32,
    pub safe_pad_px: u32,
    pub min_crop_px: u32,
}

impl Default for RoiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            margin_px: 120,
            gate_length_px: 480,
            safe_pad_px: 48,
            min_crop_px: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Run the detector on every Nth frame. Full-frame modes detect on every frame.
    pub detection_stride: u32,
    /// Detect on the whole frame, on every frame, bypassing the ROI gate
    pub full_region: bool,
    /// Report every detector class for display. Implies full-frame detection;
    /// only the configured vehicle classes are tracked and counted.
    pub show_all_classes: bool,
    pub detection_confidence: f32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            detection_stride: 3,
            full_region: false,
            show_all_classes: false,
            detection_confidence: 0.35,
        }
    }
}

/// Vehicle classes to count and their display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassNames(BTreeMap<ClassId, String>);

impl Default for ClassNames {
    /// The COCO vehicle classes.
    fn default() -> Self {
        Self(BTreeMap::from([
            (2, "car".to_string()),
            (3, "motorcycle".to_string()),
            (5, "bus".to_string()),
            (7, "truck".to_string()),
        ]))
    }
}

impl ClassNames {
    pub fn new(names: impl IntoIterator<Item = (ClassId, String)>) -> Self {
        Self(names.into_iter().collect())
    }

    /// Display name for a class; unknown classes are reported as "car".
    pub fn label(&self, class_id: ClassId) -> &str {
        self.0.get(&class_id).map(String::as_str).unwrap_or("car")
    }

    pub fn contains(&self, class_id: ClassId) -> bool {
        self.0.contains_key(&class_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.0.keys().copied()
    }
}

impl Settings {
    /// Read and validate settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_json::from_str(&contents)?;
        settings.validate()?;
        debug!(path = %path.as_ref().display(), "settings loaded");
        Ok(settings)
    }

    /// Like [`Settings::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.tracking;
        if !(t.max_match_distance.is_finite() && t.max_match_distance > 0.0) {
            return Err(invalid(
                "tracking.max_match_distance",
                format!("must be a positive number, got {}", t.max_match_distance),
            ));
        }
        if t.path_capacity < 2 {
            return Err(invalid(
                "tracking.path_capacity",
                format!("must be at least 2, got {}", t.path_capacity),
            ));
        }
        if !(self.line.band_px.is_finite() && self.line.band_px >= 0.0) {
            return Err(invalid(
                "line.band_px",
                format!("must be a non-negative number, got {}", self.line.band_px),
            ));
        }
        if self.runtime.detection_stride == 0 {
            return Err(invalid("runtime.detection_stride", "must be at least 1".to_string()));
        }
        if !self.runtime.detection_confidence.is_finite() {
            return Err(invalid(
                "runtime.detection_confidence",
                "must be a finite number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            max_match_distance: self.tracking.max_match_distance,
            max_track_lost_frames: self.tracking.max_track_lost_frames,
            min_detection_size: self.tracking.min_detection_size,
            path_capacity: self.tracking.path_capacity,
            predict_missing: self.prediction.enabled,
            max_prediction_frames: self.prediction.max_prediction_frames,
        }
    }

    /// Whole-frame detection on every frame (`full_region` or `show_all_classes`).
    pub fn full_frame_mode(&self) -> bool {
        self.runtime.full_region || self.runtime.show_all_classes
    }

    /// Effective detection stride: 1 in full-frame mode.
    pub fn detection_stride(&self) -> u32 {
        if self.full_frame_mode() {
            1
        } else {
            self.runtime.detection_stride
        }
    }

    /// The ROI gate, or `None` when detection should always use the full frame.
    pub fn gate(&self) -> Option<RoiGate> {
        if !self.roi.enabled || self.full_frame_mode() {
            return None;
        }
        Some(RoiGate {
            margin_px: self.roi.margin_px,
            gate_length_px: self.roi.gate_length_px,
            safe_pad_px: self.roi.safe_pad_px,
            min_crop_px: self.roi.min_crop_px,
        })
    }
}

fn invalid(field: &'static str, reason: String) -> Error {
    Error::InvalidConfig { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let json = r#"{ "tracking": { "max_match_distance": 60 }, "line": { "invert_direction": true } }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.tracking.max_match_distance, 60.0);
        assert_eq!(settings.tracking.max_track_lost_frames, 15);
        assert!(settings.line.invert_direction);
        assert_eq!(settings.line.band_px, 12.0);
        assert_eq!(settings.roi, RoiSettings::default());
        assert_eq!(settings.classes, ClassNames::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.runtime.detection_stride = 0;
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidConfig { field: "runtime.detection_stride", .. })
        ));

        let mut settings = Settings::default();
        settings.tracking.max_match_distance = f64::NAN;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("linecount-settings-{}.json", std::process::id()));
        let mut settings = Settings::default();
        settings.prediction.enabled = true;
        settings.line.line_type = LineType::Vertical;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("linecount-settings-does-not-exist.json");
        assert_eq!(Settings::load_or_default(path).unwrap(), Settings::default());
    }

    #[test]
    fn test_class_labels() {
        let classes = ClassNames::default();
        assert_eq!(classes.label(7), "truck");
        assert_eq!(classes.label(42), "car");
        assert!(classes.contains(3));
        assert_eq!(classes.ids().collect::<Vec<_>>(), vec![2, 3, 5, 7]);
    }

    #[test]
    fn test_full_frame_modes_disable_gate_and_stride() {
        let mut settings = Settings::default();
        assert!(settings.gate().is_some());
        assert_eq!(settings.detection_stride(), 3);

        settings.runtime.full_region = true;
        assert!(settings.gate().is_none());
        assert_eq!(settings.detection_stride(), 1);

        let mut settings = Settings::default();
        settings.runtime.show_all_classes = true;
        assert!(settings.gate().is_none());
        assert_eq!(settings.detection_stride(), 1);
    }

    #[test]
    fn test_auto_line_carries_line_settings() {
        let settings = LineSettings {
            line_type: LineType::Horizontal,
            band_px: 20.0,
            invert_direction: true,
        };
        let line = settings.auto_line(640, 480).unwrap();
        assert_eq!(line.start, Point::new(0, 240));
        assert_eq!(line.band_px, 20.0);
        assert!(line.invert_direction);
    }
}
