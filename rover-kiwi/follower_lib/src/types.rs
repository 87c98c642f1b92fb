use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates (corner form)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from top-left corner plus size, the layout detectors usually report
    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    /// Build a box of the given size centred on (cx, cy)
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }
}

/// One candidate object reported by the perception stage for a single frame.
///
/// Whatever model produced it, the tracker only ever sees this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_name: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_name: class_name.into(),
            confidence,
        }
    }

    pub fn centroid(&self) -> na::Point2<f32> {
        let (cx, cy) = self.bbox.center();
        na::Point2::new(cx, cy)
    }

    pub fn width(&self) -> f32 {
        self.bbox.width()
    }

    pub fn height(&self) -> f32 {
        self.bbox.height()
    }
}

/// A perception batch together with the frame it was computed on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
    /// Capture time in milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: i64,
    pub detections: Vec<Detection>,
}

/// Bounded actuation command handed to the motor transport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlVector {
    pub throttle: f32,
    pub steering: f32,
}

impl ControlVector {
    pub const STOP: ControlVector = ControlVector {
        throttle: 0.0,
        steering: 0.0,
    };

    pub fn new(throttle: f32, steering: f32) -> Self {
        Self { throttle, steering }
    }

    pub fn is_stop(&self) -> bool {
        self.throttle == 0.0 && self.steering == 0.0
    }
}

impl Default for ControlVector {
    fn default() -> Self {
        Self::STOP
    }
}

/// Operator commands arriving from the web UI or voice pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackingCommand {
    Enable { timestamp: i64 },
    Disable { timestamp: i64 },
    SelectTargetById { tracking_id: u64, timestamp: i64 },
    ClearTarget { timestamp: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    /// Following switched off by the operator
    Disabled,
    /// Enabled but nothing selected
    Searching,
    Tracking,
    /// Selected identity is a ghost
    TargetLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdentityStatus {
    /// Matched within the missed-frame tolerance
    Live,
    /// Ghost kept in memory until expiry
    Memory,
}

/// Per-identity row of the telemetry export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityReport {
    pub id: u64,
    pub class_name: String,
    pub status: IdentityStatus,
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub missed_frames: u32,
    pub first_seen_frame: u64,
    pub last_seen_frame: u64,
    pub age_frames: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingTelemetry {
    pub state: TrackingState,
    pub target: Option<IdentityReport>,
    pub identities: Vec<IdentityReport>,
    pub command: ControlVector,
    pub frame_index: u64,
    pub timestamp: i64,
}
