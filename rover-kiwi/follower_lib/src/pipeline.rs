//! One control cycle: filter -> track -> select -> control.

use crate::config::FollowerConfig;
use crate::controller::{ControlMode, ControlOutput, MotionController};
use crate::filter::DetectionFilter;
use crate::selector::TargetSelector;
use crate::tracker::{IdentityId, IdentityTracker, RegistryDelta};
use crate::types::{ControlVector, Detection, DetectionFrame, TrackingCommand, TrackingState, TrackingTelemetry};
use std::borrow::Cow;
use tracing::{debug, info};

/// Result of one `step`
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub frame_index: u64,
    pub control: ControlOutput,
    pub target: Option<IdentityId>,
    pub delta: RegistryDelta,
}

/// Owns all per-run state of the follower: the identity registry, the
/// selector's memory and the operator's enable switch
#[derive(Debug, Clone)]
pub struct FollowerPipeline {
    filter: Option<DetectionFilter>,
    tracker: IdentityTracker,
    selector: TargetSelector,
    controller: MotionController,
    enabled: bool,
    last_frame_index: u64,
    last_command: ControlVector,
}

impl FollowerPipeline {
    pub fn new(config: FollowerConfig) -> Self {
        Self {
            filter: config
                .filter_enabled
                .then(|| DetectionFilter::new(config.filter.clone())),
            tracker: IdentityTracker::new(config.tracker),
            selector: TargetSelector::new(config.selector),
            controller: MotionController::new(config.controller),
            enabled: true,
            last_frame_index: 0,
            last_command: ControlVector::STOP,
        }
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    pub fn selector(&self) -> &TargetSelector {
        &self.selector
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn step(&mut self, frame: &DetectionFrame) -> FrameOutcome {
        let width = frame.width as f32;
        let height = frame.height as f32;

        // Filter detections unless an upstream node already did
        let detections: Cow<'_, [Detection]> = match &self.filter {
            Some(filter) => Cow::Owned(filter.apply(&frame.detections, width, height)),
            None => Cow::Borrowed(&frame.detections),
        };

        // Update identities and pick the target
        let delta = self.tracker.update(&detections, frame.frame_index);
        let target = self.selector.select(&self.tracker);

        // Compute motor command, stopped while following is disabled
        let control = if self.enabled {
            self.controller
                .compute(target.and_then(|id| self.tracker.get(id)), width, height)
        } else {
            ControlOutput {
                vector: ControlVector::STOP,
                mode: ControlMode::NoTarget,
            }
        };

        debug!(
            "Frame {}: target={:?} mode={} throttle={:.2} steering={:.2}",
            frame.frame_index,
            target,
            control.mode,
            control.vector.throttle,
            control.vector.steering
        );

        // Remember for telemetry
        self.last_frame_index = frame.frame_index;
        self.last_command = control.vector;

        FrameOutcome {
            frame_index: frame.frame_index,
            control,
            target,
            delta,
        }
    }

    pub fn handle_command(&mut self, command: TrackingCommand) {
        match command {
            TrackingCommand::Enable { timestamp } => {
                info!("Following enabled at {}", timestamp);
                self.enabled = true;
            }
            TrackingCommand::Disable { timestamp } => {
                info!("Following disabled at {}", timestamp);
                self.enabled = false;
                self.last_command = ControlVector::STOP;
            }
            TrackingCommand::SelectTargetById {
                tracking_id,
                timestamp,
            } => {
                if self.selector.lock(tracking_id, &self.tracker) {
                    info!("Selected target ID {} at {}", tracking_id, timestamp);
                    self.enabled = true;
                }
            }
            TrackingCommand::ClearTarget { timestamp } => {
                info!("Cleared target at {}", timestamp);
                self.selector.clear();
            }
        }
    }

    pub fn telemetry(&self, timestamp: i64) -> TrackingTelemetry {
        let frame_index = self.last_frame_index;
        let target = self
            .selector
            .current()
            .and_then(|id| self.tracker.get(id));

        let state = if !self.enabled {
            TrackingState::Disabled
        } else {
            match target {
                Some(identity) if identity.is_ghost() => TrackingState::TargetLost,
                Some(_) => TrackingState::Tracking,
                None => TrackingState::Searching,
            }
        };

        TrackingTelemetry {
            state,
            target: target.map(|identity| identity.report(frame_index)),
            identities: self.tracker.snapshot(frame_index),
            command: self.last_command,
            frame_index,
            timestamp,
        }
    }
}
