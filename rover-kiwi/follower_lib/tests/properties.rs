use proptest::prelude::*;
use robo_follower_lib::types::BoundingBox;
use robo_follower_lib::{
    ControllerConfig, Detection, GhostExpiry, IdentityState, IdentityTracker, MotionController, TrackedIdentity,
    TrackerConfig,
};

fn config() -> TrackerConfig {
    TrackerConfig {
        max_tracking_distance: 120.0,
        ghost_missed_frame_threshold: 3,
        ghost_expiry: GhostExpiry::Frames(8),
        class_gated: false,
    }
}

fn detection_strategy() -> impl Strategy<Value = Detection> {
    (0.0f32..1280.0, 0.0f32..720.0, 1.0f32..300.0, 1.0f32..300.0)
        .prop_map(|(cx, cy, w, h)| Detection::new(BoundingBox::from_center(cx, cy, w, h), "cup", 0.9))
}

fn frames_strategy() -> impl Strategy<Value = Vec<Vec<Detection>>> {
    prop::collection::vec(prop::collection::vec(detection_strategy(), 0..6), 1..25)
}

proptest! {
    #[test]
    fn replay_gives_identical_assignments(frames in frames_strategy()) {
        let mut a = IdentityTracker::new(config());
        let mut b = IdentityTracker::new(config());

        for (index, detections) in frames.iter().enumerate() {
            let frame = index as u64 + 1;
            prop_assert_eq!(a.update(detections, frame), b.update(detections, frame));
        }
    }

    #[test]
    fn matching_is_one_to_one(frames in frames_strategy()) {
        let mut tracker = IdentityTracker::new(config());

        for (index, detections) in frames.iter().enumerate() {
            let delta = tracker.update(detections, index as u64 + 1);

            let mut ids: Vec<_> = delta.assignments.iter().map(|(id, _)| *id).collect();
            let mut dets: Vec<_> = delta.assignments.iter().map(|(_, d)| *d).collect();
            ids.sort_unstable();
            dets.sort_unstable();
            let (id_count, det_count) = (ids.len(), dets.len());
            ids.dedup();
            dets.dedup();
            prop_assert_eq!(ids.len(), id_count);
            prop_assert_eq!(dets.len(), det_count);
            // Every detection ends up with exactly one identity
            prop_assert_eq!(det_count, detections.len());
        }
    }

    #[test]
    fn ids_only_grow(frames in frames_strategy()) {
        let mut tracker = IdentityTracker::new(config());
        let mut highest = 0;

        for (index, detections) in frames.iter().enumerate() {
            let delta = tracker.update(detections, index as u64 + 1);
            for id in delta.created {
                prop_assert!(id > highest);
                highest = id;
            }
        }
    }

    #[test]
    fn small_steps_keep_the_same_id(
        start_x in 200.0f32..1000.0,
        start_y in 200.0f32..500.0,
        steps in prop::collection::vec((-80.0f32..80.0, -80.0f32..80.0), 1..40),
    ) {
        let mut tracker = IdentityTracker::new(config());
        let (mut x, mut y) = (start_x, start_y);
        tracker.update(&[Detection::new(BoundingBox::from_center(x, y, 50.0, 50.0), "cup", 0.9)], 1);

        for (index, (dx, dy)) in steps.iter().enumerate() {
            x += dx;
            y += dy;
            let delta = tracker.update(
                &[Detection::new(BoundingBox::from_center(x, y, 50.0, 50.0), "cup", 0.9)],
                index as u64 + 2,
            );
            prop_assert_eq!(delta.identity_for(0), Some(1));
        }
    }

    #[test]
    fn registry_never_holds_expired_identities(frames in frames_strategy()) {
        let mut tracker = IdentityTracker::new(config());

        for (index, detections) in frames.iter().enumerate() {
            let frame = index as u64 + 1;
            tracker.update(detections, frame);
            for identity in tracker.identities() {
                prop_assert!(identity.ghost_age(frame) <= tracker.expiry_frames());
            }
        }
    }

    #[test]
    fn controller_output_is_bounded(
        cx in -5000.0f32..5000.0,
        width in 0.0f32..10000.0,
        frame_width in 1.0f32..4000.0,
        frame_height in 1.0f32..4000.0,
        kp_steer in 0.0f32..20.0,
        kp_throttle in 0.0f32..20.0,
        ratio in 0.01f32..1.0,
        limit in 0.1f32..2.0,
    ) {
        let controller = MotionController::new(ControllerConfig {
            kp_steer,
            kp_throttle,
            target_width_ratio: ratio,
            output_limit: limit,
        });
        let identity = TrackedIdentity {
            id: 1,
            centroid: nalgebra::Point2::new(cx, frame_height / 2.0),
            width,
            height: width,
            class_name: "cup".into(),
            confidence: 0.9,
            state: IdentityState::Active,
            missed_frames: 0,
            first_seen_frame: 1,
            last_seen_frame: 1,
        };

        let vector = controller.compute(Some(&identity), frame_width, frame_height).vector;
        prop_assert!(vector.throttle.is_finite() && vector.steering.is_finite());
        prop_assert!(vector.throttle.abs() <= limit);
        prop_assert!(vector.steering.abs() <= limit);
    }
}
