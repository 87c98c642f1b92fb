//! Target-following core for the rover: turns per-frame detections into
//! persistent identities, picks one to pursue and converts its framing into
//! bounded throttle/steering commands.
//!
//! - [`tracker`]: greedy nearest-centroid identity tracking with ghost memory
//! - [`selector`]: deterministic pursuit-target choice
//! - [`controller`]: stateless proportional motion control
//! - [`pipeline`]: one control cycle wiring the above together

pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod selector;
pub mod tracker;
pub mod types;
pub mod wire;

pub use config::FollowerConfig;
pub use controller::{ControlMode, ControlOutput, ControllerConfig, MotionController};
pub use error::{ConfigError, WireError};
pub use filter::{DetectionFilter, DetectionFilterConfig};
pub use pipeline::{FollowerPipeline, FrameOutcome};
pub use selector::{select_target, SelectorPolicy, TargetSelector};
pub use tracker::{
    GhostExpiry, IdentityId, IdentityState, IdentityTracker, RegistryDelta, TrackedIdentity, TrackerConfig,
};
pub use types::{ControlVector, Detection, DetectionFrame, TrackingCommand};

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the node's log subscriber. `RUST_LOG` overrides the default
/// `info` level. Keep the returned guard alive for the life of the node.
pub fn init_tracing() -> DefaultGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_names(true));

    tracing::subscriber::set_default(subscriber)
}
