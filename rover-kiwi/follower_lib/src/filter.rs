//! Pre-tracking detection filter: class allow-list, confidence floor, minimum
//! box size and frame-border exclusion.

use crate::types::Detection;
use tracing::trace;

pub const DEFAULT_TARGET_CLASSES: &[&str] = &["bottle", "cup", "can", "sports ball", "orange", "apple"];

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFilterConfig {
    /// Accepted labels, compared case-insensitively. Empty accepts everything.
    pub target_classes: Vec<String>,
    pub min_confidence: f32,
    /// Minimum box width and height in pixels
    pub min_box_size: f32,
    /// Boxes reaching within this many pixels of a frame edge are dropped
    pub border_margin: f32,
}

impl Default for DetectionFilterConfig {
    fn default() -> Self {
        Self {
            target_classes: DEFAULT_TARGET_CLASSES.iter().map(|c| c.to_string()).collect(),
            min_confidence: 0.7,
            min_box_size: 20.0,
            border_margin: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionFilter {
    config: DetectionFilterConfig,
    classes: Vec<String>,
}

impl DetectionFilter {
    pub fn new(config: DetectionFilterConfig) -> Self {
        let classes = config
            .target_classes
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        Self { config, classes }
    }

    pub fn config(&self) -> &DetectionFilterConfig {
        &self.config
    }

    fn class_accepted(&self, class_name: &str) -> bool {
        self.classes.is_empty() || self.classes.iter().any(|c| *c == class_name.to_lowercase())
    }

    fn touches_border(&self, detection: &Detection, frame_width: f32, frame_height: f32) -> bool {
        let margin = self.config.border_margin;
        let bbox = &detection.bbox;
        bbox.x1 < margin
            || bbox.y1 < margin
            || bbox.x2 > frame_width - margin
            || bbox.y2 > frame_height - margin
    }

    pub fn accepts(&self, detection: &Detection, frame_width: f32, frame_height: f32) -> bool {
        if !detection.bbox.is_finite() || !detection.confidence.is_finite() {
            return false;
        }
        if !self.class_accepted(&detection.class_name) {
            return false;
        }
        if detection.confidence < self.config.min_confidence {
            return false;
        }
        if detection.width() < self.config.min_box_size || detection.height() < self.config.min_box_size {
            return false;
        }
        !self.touches_border(detection, frame_width, frame_height)
    }

    /// Keep accepted detections, preserving their order
    pub fn apply(&self, detections: &[Detection], frame_width: f32, frame_height: f32) -> Vec<Detection> {
        let kept: Vec<Detection> = detections
            .iter()
            .filter(|d| self.accepts(d, frame_width, frame_height))
            .cloned()
            .collect();

        trace!("Detection filter kept {}/{}", kept.len(), detections.len());
        kept
    }
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self::new(DetectionFilterConfig::default())
    }
}
