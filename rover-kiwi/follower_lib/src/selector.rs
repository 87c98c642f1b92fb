//! Picks which identity the rover pursues.

use crate::tracker::{IdentityId, IdentityTracker, TrackedIdentity};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorPolicy {
    /// Hold on to a target that missed the latest frame (still Active or
    /// already a ghost) instead of switching to another identity while it is
    /// occluded
    pub prefer_ghost_continuity: bool,
}

impl Default for SelectorPolicy {
    fn default() -> Self {
        Self {
            prefer_ghost_continuity: true,
        }
    }
}

/// Most recently matched identity passing `filter`, lowest id on ties
fn most_recent<'a>(
    identities: impl IntoIterator<Item = &'a TrackedIdentity>,
    filter: impl Fn(&TrackedIdentity) -> bool,
) -> Option<IdentityId> {
    identities
        .into_iter()
        .filter(|identity| filter(*identity))
        .min_by(|a, b| {
            b.last_seen_frame
                .cmp(&a.last_seen_frame)
                .then(a.id.cmp(&b.id))
        })
        .map(|identity| identity.id)
}

/// Memoryless selection rule: the freshest Active identity, falling back to
/// the freshest ghost when the policy allows it.
pub fn select_target<'a, I>(identities: I, policy: &SelectorPolicy) -> Option<IdentityId>
where
    I: IntoIterator<Item = &'a TrackedIdentity>,
    I::IntoIter: Clone,
{
    let identities = identities.into_iter();

    most_recent(identities.clone(), TrackedIdentity::is_active).or_else(|| {
        if policy.prefer_ghost_continuity {
            most_recent(identities, TrackedIdentity::is_ghost)
        } else {
            None
        }
    })
}

/// Selection with memory of the previous frame's target and an optional
/// operator lock
#[derive(Debug, Clone, Default)]
pub struct TargetSelector {
    policy: SelectorPolicy,
    current: Option<IdentityId>,
    locked: Option<IdentityId>,
}

impl TargetSelector {
    pub fn new(policy: SelectorPolicy) -> Self {
        Self {
            policy,
            current: None,
            locked: None,
        }
    }

    pub fn policy(&self) -> &SelectorPolicy {
        &self.policy
    }

    pub fn current(&self) -> Option<IdentityId> {
        self.current
    }

    pub fn locked(&self) -> Option<IdentityId> {
        self.locked
    }

    pub fn select(&mut self, tracker: &IdentityTracker) -> Option<IdentityId> {
        if let Some(locked) = self.locked {
            if tracker.contains(locked) {
                self.current = Some(locked);
                return self.current;
            }
            info!("Locked target {} left the registry, releasing lock", locked);
            self.locked = None;
        }

        if self.policy.prefer_ghost_continuity {
            // Unseen this frame: keep it until it is matched again or purged
            if let Some(previous) = self.current.and_then(|id| tracker.get(id)) {
                if previous.is_ghost() || previous.missed_frames > 0 {
                    debug!(
                        "Holding target {} through occlusion ({:?}, {} missed)",
                        previous.id, previous.state, previous.missed_frames
                    );
                    return self.current;
                }
            }
        }

        let next = select_target(tracker.identities(), &self.policy);
        if next != self.current {
            info!("Target changed: {:?} -> {:?}", self.current, next);
        }
        self.current = next;
        next
    }

    /// Pin the target to `id`. Refused when the id is not in the registry.
    pub fn lock(&mut self, id: IdentityId, tracker: &IdentityTracker) -> bool {
        if !tracker.contains(id) {
            warn!("Cannot lock target {}: not in registry", id);
            return false;
        }
        self.locked = Some(id);
        self.current = Some(id);
        true
    }

    pub fn clear(&mut self) {
        self.locked = None;
        self.current = None;
    }
}
