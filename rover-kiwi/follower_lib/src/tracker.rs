//! Frame-to-frame identity tracking by greedy centroid association.
//!
//! Detections arrive without ids. Each update pairs them with the identities
//! already in the registry by Euclidean centroid distance, smallest pair
//! first, and carries unmatched identities forward as ghosts until their
//! expiry budget runs out. The registry is the only state that survives
//! between frames.

use crate::types::{Detection, IdentityReport, IdentityStatus};
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info};

pub type IdentityId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityState {
    Active,
    Ghost,
}

/// How long an unmatched identity stays in memory before it is purged
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GhostExpiry {
    Frames(u64),
    /// Wall-clock budget, converted with the nominal camera frame rate
    Time { duration: Duration, frame_rate: f32 },
}

impl GhostExpiry {
    /// Budget expressed in frames. A time budget rounds up so a 5 s budget at
    /// 30 fps keeps a ghost for 150 frames.
    pub fn as_frames(&self) -> u64 {
        match *self {
            GhostExpiry::Frames(frames) => frames,
            GhostExpiry::Time {
                duration,
                frame_rate,
            } => {
                if !(frame_rate.is_finite() && frame_rate > 0.0) {
                    return 0;
                }
                (duration.as_secs_f64() * frame_rate as f64).ceil() as u64
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Centroid distance in pixels a match must stay strictly below
    pub max_tracking_distance: f32,
    /// Consecutive misses tolerated before an identity turns into a ghost
    pub ghost_missed_frame_threshold: u32,
    pub ghost_expiry: GhostExpiry,
    /// Only match detections carrying the identity's class label
    pub class_gated: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_tracking_distance: 400.0,
            ghost_missed_frame_threshold: 10,
            ghost_expiry: GhostExpiry::Time {
                duration: Duration::from_secs(5),
                frame_rate: 30.0,
            },
            class_gated: false,
        }
    }
}

/// A persistent identity owned by the tracker's registry
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedIdentity {
    pub id: IdentityId,
    pub centroid: na::Point2<f32>,
    pub width: f32,
    pub height: f32,
    pub class_name: String,
    pub confidence: f32,
    pub state: IdentityState,
    pub missed_frames: u32,
    pub first_seen_frame: u64,
    pub last_seen_frame: u64,
}

impl TrackedIdentity {
    fn new(id: IdentityId, detection: &Detection, frame_index: u64) -> Self {
        Self {
            id,
            centroid: detection.centroid(),
            width: detection.width(),
            height: detection.height(),
            class_name: detection.class_name.clone(),
            confidence: detection.confidence,
            state: IdentityState::Active,
            missed_frames: 0,
            first_seen_frame: frame_index,
            last_seen_frame: frame_index,
        }
    }

    /// Take over the matched detection's geometry. Returns true when this
    /// brought a ghost back.
    fn update(&mut self, detection: &Detection, frame_index: u64) -> bool {
        let revived = self.state == IdentityState::Ghost;

        self.centroid = detection.centroid();
        self.width = detection.width();
        self.height = detection.height();
        self.class_name = detection.class_name.clone();
        self.confidence = detection.confidence;
        self.state = IdentityState::Active;
        self.missed_frames = 0;
        self.last_seen_frame = frame_index;

        revived
    }

    /// Count a frame without a match. Returns true on the Active -> Ghost edge.
    fn mark_missed(&mut self, ghost_threshold: u32) -> bool {
        self.missed_frames = self.missed_frames.saturating_add(1);

        if self.state == IdentityState::Active && self.missed_frames > ghost_threshold {
            self.state = IdentityState::Ghost;
            return true;
        }
        false
    }

    pub fn is_active(&self) -> bool {
        self.state == IdentityState::Active
    }

    pub fn is_ghost(&self) -> bool {
        self.state == IdentityState::Ghost
    }

    /// Frames elapsed since the last successful match
    pub fn ghost_age(&self, frame_index: u64) -> u64 {
        frame_index.saturating_sub(self.last_seen_frame)
    }

    pub fn distance_to(&self, detection: &Detection) -> f32 {
        na::distance(&self.centroid, &detection.centroid())
    }

    pub fn report(&self, frame_index: u64) -> IdentityReport {
        IdentityReport {
            id: self.id,
            class_name: self.class_name.clone(),
            status: match self.state {
                IdentityState::Active => IdentityStatus::Live,
                IdentityState::Ghost => IdentityStatus::Memory,
            },
            center_x: self.centroid.x,
            center_y: self.centroid.y,
            width: self.width,
            height: self.height,
            missed_frames: self.missed_frames,
            first_seen_frame: self.first_seen_frame,
            last_seen_frame: self.last_seen_frame,
            age_frames: frame_index.saturating_sub(self.first_seen_frame),
        }
    }
}

/// What one update did to the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryDelta {
    /// (identity, detection index) pairs in the order they were committed
    pub assignments: Vec<(IdentityId, usize)>,
    pub created: Vec<IdentityId>,
    /// Re-matched while in the Ghost state
    pub revived: Vec<IdentityId>,
    /// Crossed the missed-frame threshold this frame
    pub ghosted: Vec<IdentityId>,
    pub purged: Vec<IdentityId>,
}

impl RegistryDelta {
    pub fn identity_for(&self, detection_index: usize) -> Option<IdentityId> {
        self.assignments
            .iter()
            .find(|(_, idx)| *idx == detection_index)
            .map(|(id, _)| *id)
    }
}

/// Candidate identity/detection pair below the distance gate
struct Candidate {
    distance: f32,
    id: IdentityId,
    detection: usize,
}

/// Owns the identity registry and the id counter
#[derive(Debug, Clone)]
pub struct IdentityTracker {
    config: TrackerConfig,
    identities: BTreeMap<IdentityId, TrackedIdentity>,
    next_id: IdentityId,
    expiry_frames: u64,
}

impl IdentityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let expiry_frames = config.ghost_expiry.as_frames();
        Self {
            config,
            identities: BTreeMap::new(),
            next_id: 1,
            expiry_frames,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Run one frame of association and lifecycle bookkeeping
    pub fn update(&mut self, detections: &[Detection], frame_index: u64) -> RegistryDelta {
        let mut delta = RegistryDelta::default();

        let mut matched_ids = BTreeSet::new();
        let mut matched_detections = BTreeSet::new();

        // Greedy association, closest pair first
        for candidate in self.candidates(detections) {
            if matched_ids.contains(&candidate.id) || matched_detections.contains(&candidate.detection) {
                continue;
            }

            // Update matched identity, reviving it if it was a ghost
            if let Some(identity) = self.identities.get_mut(&candidate.id) {
                let missed = identity.missed_frames;
                if identity.update(&detections[candidate.detection], frame_index) {
                    info!(
                        "Identity {} ({}) re-acquired after {} missed frames, {:.1} px away",
                        candidate.id, identity.class_name, missed, candidate.distance
                    );
                    delta.revived.push(candidate.id);
                }
                matched_ids.insert(candidate.id);
                matched_detections.insert(candidate.detection);
                delta.assignments.push((candidate.id, candidate.detection));
            }
        }

        // Age everything that found no partner this frame
        let ghost_threshold = self.config.ghost_missed_frame_threshold;
        let mut expired = Vec::new();
        for (id, identity) in self.identities.iter_mut() {
            if matched_ids.contains(id) {
                continue;
            }
            if identity.mark_missed(ghost_threshold) {
                debug!("Identity {} became a ghost after {} missed frames", id, identity.missed_frames);
                delta.ghosted.push(*id);
            }
            if identity.ghost_age(frame_index) > self.expiry_frames {
                expired.push(*id);
            }
        }

        // Remove identities past the expiry budget
        for id in expired {
            if let Some(identity) = self.identities.remove(&id) {
                info!(
                    "Identity {} ({}) purged, unseen since frame {}",
                    id, identity.class_name, identity.last_seen_frame
                );
                delta.purged.push(id);
            }
        }

        // Leftover detections start new identities in list order
        for (idx, detection) in detections.iter().enumerate() {
            if matched_detections.contains(&idx) {
                continue;
            }
            let id = self.allocate_id();
            info!(
                "New identity {} ({}) at ({:.0}, {:.0})",
                id,
                detection.class_name,
                detection.centroid().x,
                detection.centroid().y
            );
            self.identities
                .insert(id, TrackedIdentity::new(id, detection, frame_index));
            delta.created.push(id);
            delta.assignments.push((id, idx));
        }

        debug!(
            "Frame {}: {} detections, {} matched, {} new, {} purged, registry {} (active: {})",
            frame_index,
            detections.len(),
            matched_ids.len(),
            delta.created.len(),
            delta.purged.len(),
            self.identities.len(),
            self.identities.values().filter(|i| i.is_active()).count()
        );

        delta
    }

    /// All gated pairs sorted by distance, then lowest id, then detection order
    fn candidates(&self, detections: &[Detection]) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for (id, identity) in &self.identities {
            for (idx, detection) in detections.iter().enumerate() {
                if self.config.class_gated && identity.class_name != detection.class_name {
                    continue;
                }

                let distance = identity.distance_to(detection);
                if distance.is_finite() && distance < self.config.max_tracking_distance {
                    candidates.push(Candidate {
                        distance,
                        id: *id,
                        detection: idx,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.id.cmp(&b.id))
                .then(a.detection.cmp(&b.detection))
        });

        candidates
    }

    fn allocate_id(&mut self) -> IdentityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: IdentityId) -> Option<&TrackedIdentity> {
        self.identities.get(&id)
    }

    pub fn contains(&self, id: IdentityId) -> bool {
        self.identities.contains_key(&id)
    }

    /// Registry contents in ascending id order
    pub fn identities(&self) -> impl Iterator<Item = &TrackedIdentity> + Clone {
        self.identities.values()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn expiry_frames(&self) -> u64 {
        self.expiry_frames
    }

    /// Per-identity telemetry rows in id order
    pub fn snapshot(&self, frame_index: u64) -> Vec<IdentityReport> {
        self.identities
            .values()
            .map(|identity| identity.report(frame_index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn det(cx: f32, cy: f32) -> Detection {
        Detection::new(BoundingBox::from_center(cx, cy, 40.0, 40.0), "bottle", 0.9)
    }

    fn tracker() -> IdentityTracker {
        IdentityTracker::new(TrackerConfig {
            max_tracking_distance: 100.0,
            ghost_missed_frame_threshold: 2,
            ghost_expiry: GhostExpiry::Frames(5),
            class_gated: false,
        })
    }

    #[test]
    fn time_budget_rounds_up_to_frames() {
        let expiry = GhostExpiry::Time {
            duration: Duration::from_secs(5),
            frame_rate: 30.0,
        };
        assert_eq!(expiry.as_frames(), 150);

        let partial = GhostExpiry::Time {
            duration: Duration::from_millis(1010),
            frame_rate: 10.0,
        };
        assert_eq!(partial.as_frames(), 11);

        let broken = GhostExpiry::Time {
            duration: Duration::from_secs(5),
            frame_rate: 0.0,
        };
        assert_eq!(broken.as_frames(), 0);
    }

    #[test]
    fn empty_frame_creates_nothing() {
        let mut tracker = tracker();
        let delta = tracker.update(&[], 1);
        assert_eq!(delta, RegistryDelta::default());
        assert!(tracker.is_empty());
    }

    #[test]
    fn ids_start_at_one_and_follow_detection_order() {
        let mut tracker = tracker();
        let delta = tracker.update(&[det(100.0, 100.0), det(400.0, 100.0)], 1);
        assert_eq!(delta.created, vec![1, 2]);
        assert_eq!(delta.identity_for(0), Some(1));
        assert_eq!(delta.identity_for(1), Some(2));
    }

    #[test]
    fn match_resets_missed_frames() {
        let mut tracker = tracker();
        tracker.update(&[det(100.0, 100.0)], 1);
        tracker.update(&[], 2);
        assert_eq!(tracker.get(1).unwrap().missed_frames, 1);

        tracker.update(&[det(110.0, 100.0)], 3);
        let identity = tracker.get(1).unwrap();
        assert_eq!(identity.missed_frames, 0);
        assert_eq!(identity.last_seen_frame, 3);
        assert_eq!(identity.centroid, na::Point2::new(110.0, 100.0));
    }

    #[test]
    fn ghost_after_threshold_then_revived() {
        let mut tracker = tracker();
        tracker.update(&[det(100.0, 100.0)], 1);

        let d2 = tracker.update(&[], 2);
        let d3 = tracker.update(&[], 3);
        assert!(d2.ghosted.is_empty() && d3.ghosted.is_empty());
        assert!(tracker.get(1).unwrap().is_active());

        let d4 = tracker.update(&[], 4);
        assert_eq!(d4.ghosted, vec![1]);
        assert!(tracker.get(1).unwrap().is_ghost());

        let d5 = tracker.update(&[det(105.0, 100.0)], 5);
        assert_eq!(d5.revived, vec![1]);
        assert!(d5.created.is_empty());
        assert!(tracker.get(1).unwrap().is_active());
    }

    #[test]
    fn purge_after_expiry_and_ids_not_reused() {
        let mut tracker = tracker();
        tracker.update(&[det(100.0, 100.0)], 1);
        for frame in 2..=6 {
            let delta = tracker.update(&[], frame);
            assert!(delta.purged.is_empty(), "purged early at frame {frame}");
        }
        let delta = tracker.update(&[], 7);
        assert_eq!(delta.purged, vec![1]);
        assert!(tracker.is_empty());

        let delta = tracker.update(&[det(100.0, 100.0)], 8);
        assert_eq!(delta.created, vec![2]);
    }

    #[test]
    fn distance_gate_is_strict() {
        let mut tracker = tracker();
        tracker.update(&[det(100.0, 100.0)], 1);
        let delta = tracker.update(&[det(200.0, 100.0)], 2);
        assert_eq!(delta.created, vec![2]);
        assert_eq!(tracker.get(1).unwrap().missed_frames, 1);
    }

    #[test]
    fn equidistant_detection_goes_to_lower_id() {
        let mut tracker = tracker();
        tracker.update(&[det(100.0, 100.0), det(200.0, 100.0)], 1);

        let delta = tracker.update(&[det(150.0, 100.0)], 2);
        assert_eq!(delta.assignments, vec![(1, 0)]);
        assert_eq!(tracker.get(2).unwrap().missed_frames, 1);
    }

    #[test]
    fn equidistant_detections_go_in_list_order() {
        let mut tracker = tracker();
        tracker.update(&[det(100.0, 100.0)], 1);

        let delta = tracker.update(&[det(130.0, 100.0), det(70.0, 100.0)], 2);
        assert_eq!(delta.identity_for(0), Some(1));
        assert_eq!(delta.identity_for(1), Some(2));
    }

    #[test]
    fn global_minimum_beats_iteration_order() {
        let mut tracker = tracker();
        tracker.update(&[det(100.0, 100.0), det(180.0, 100.0)], 1);

        // Identity 1 is 60 px from the detection, identity 2 only 20 px
        let delta = tracker.update(&[det(160.0, 100.0)], 2);
        assert_eq!(delta.assignments, vec![(2, 0)]);
    }

    #[test]
    fn duplicate_detections_are_not_merged() {
        let mut tracker = tracker();
        let delta = tracker.update(&[det(100.0, 100.0), det(100.0, 100.0)], 1);
        assert_eq!(delta.created, vec![1, 2]);
    }

    #[test]
    fn class_gate_blocks_cross_label_matches() {
        let mut tracker = IdentityTracker::new(TrackerConfig {
            class_gated: true,
            ..tracker().config().clone()
        });
        tracker.update(&[det(100.0, 100.0)], 1);

        let cup = Detection::new(BoundingBox::from_center(105.0, 100.0, 40.0, 40.0), "cup", 0.9);
        let delta = tracker.update(&[cup], 2);
        assert_eq!(delta.created, vec![2]);
    }

    #[test]
    fn non_finite_detection_never_matches() {
        let mut tracker = tracker();
        tracker.update(&[det(100.0, 100.0)], 1);
        let delta = tracker.update(&[det(f32::NAN, 100.0)], 2);
        assert!(delta.identity_for(0) != Some(1));
    }

    #[test]
    fn snapshot_marks_ghosts_as_memory() {
        let mut tracker = tracker();
        tracker.update(&[det(100.0, 100.0)], 1);
        for frame in 2..=4 {
            tracker.update(&[], frame);
        }
        let rows = tracker.snapshot(4);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, IdentityStatus::Memory);
        assert_eq!(rows[0].missed_frames, 3);
        assert_eq!(rows[0].age_frames, 3);
    }
}
