//! Proportional steering and throttle from the selected identity's framing.
//!
//! Steering drives the horizontal offset of the target centroid towards the
//! image centre. Throttle uses the apparent box width as a distance proxy:
//! the rover advances while the target looks smaller than
//! `target_width_ratio` of the frame and backs off once it looks larger.
//! No integral or derivative term and no memory between frames.

use crate::tracker::TrackedIdentity;
use crate::types::ControlVector;
use std::fmt;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    pub kp_steer: f32,
    pub kp_throttle: f32,
    /// Desired box width as a fraction of the frame width
    pub target_width_ratio: f32,
    /// Symmetric bound applied to both outputs
    pub output_limit: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kp_steer: 0.6,
            kp_throttle: 2.5,
            target_width_ratio: 0.4,
            output_limit: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Nothing to follow (none selected, or the selection is a ghost)
    NoTarget,
    HasTarget,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::NoTarget => write!(f, "NO TARGET - STOPPED"),
            ControlMode::HasTarget => write!(f, "TRACKING"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutput {
    pub vector: ControlVector,
    pub mode: ControlMode,
}

impl ControlOutput {
    fn stop() -> Self {
        Self {
            vector: ControlVector::STOP,
            mode: ControlMode::NoTarget,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MotionController {
    config: ControllerConfig,
}

impl MotionController {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Bound that is always usable by `clamp`
    fn limit(&self) -> f32 {
        let limit = self.config.output_limit;
        if limit.is_finite() && limit > 0.0 {
            limit
        } else {
            1.0
        }
    }

    fn bounded(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return 0.0;
        }
        let limit = self.limit();
        value.clamp(-limit, limit)
    }

    pub fn compute(
        &self,
        selected: Option<&TrackedIdentity>,
        frame_width: f32,
        frame_height: f32,
    ) -> ControlOutput {
        let target = match selected {
            Some(identity) if identity.is_active() => identity,
            _ => return ControlOutput::stop(),
        };

        let frame_ok = frame_width.is_finite()
            && frame_width > 0.0
            && frame_height.is_finite()
            && frame_height > 0.0;
        let target_ok = target.centroid.x.is_finite() && target.width.is_finite();
        if !frame_ok || !target_ok {
            return ControlOutput::stop();
        }

        let half_width = frame_width / 2.0;
        let error_x = target.centroid.x - half_width;
        let steering = self.bounded(self.config.kp_steer * error_x / half_width);

        let size_ratio = target.width.max(0.0) / frame_width;
        let throttle =
            self.bounded(self.config.kp_throttle * (self.config.target_width_ratio - size_ratio));

        trace!(
            "Target {}: error_x={:.1}px size_ratio={:.3} -> throttle={:.2} steering={:.2}",
            target.id,
            error_x,
            size_ratio,
            throttle,
            steering
        );

        ControlOutput {
            vector: ControlVector::new(throttle, steering),
            mode: ControlMode::HasTarget,
        }
    }
}
