//! Follower configuration read from environment variables.
//!
//! Every variable is optional; an unset variable keeps its default while a
//! set but unparsable one is an error rather than a silent fallback.

use crate::controller::ControllerConfig;
use crate::error::ConfigError;
use crate::filter::DetectionFilterConfig;
use crate::selector::SelectorPolicy;
use crate::tracker::{GhostExpiry, TrackerConfig};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct FollowerConfig {
    pub tracker: TrackerConfig,
    pub selector: SelectorPolicy,
    pub controller: ControllerConfig,
    pub filter: DetectionFilterConfig,
    /// Run the detection filter before tracking. Disable when the upstream
    /// detector already applies it.
    pub filter_enabled: bool,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            selector: SelectorPolicy::default(),
            controller: ControllerConfig::default(),
            filter: DetectionFilterConfig::default(),
            filter_enabled: true,
        }
    }
}

fn read<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn read_optional<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn ensure(condition: bool, key: &'static str, reason: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key,
            reason: reason.to_string(),
        })
    }
}

impl FollowerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key/value source, then validate
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = FollowerConfig::default();

        let frame_rate = read(&lookup, "FRAME_RATE", 30.0f32)?;
        let expiry_secs = read(&lookup, "GHOST_EXPIRY_SECS", 5.0f64)?;
        ensure(
            expiry_secs.is_finite() && expiry_secs >= 0.0,
            "GHOST_EXPIRY_SECS",
            "must be a finite, non-negative number of seconds",
        )?;
        let ghost_expiry = match read_optional::<u64, _>(&lookup, "GHOST_EXPIRY_FRAMES")? {
            Some(frames) => GhostExpiry::Frames(frames),
            None => GhostExpiry::Time {
                duration: Duration::try_from_secs_f64(expiry_secs).map_err(|e| ConfigError::OutOfRange {
                    key: "GHOST_EXPIRY_SECS",
                    reason: e.to_string(),
                })?,
                frame_rate,
            },
        };

        let tracker = TrackerConfig {
            max_tracking_distance: read(
                &lookup,
                "MAX_TRACKING_DISTANCE",
                defaults.tracker.max_tracking_distance,
            )?,
            ghost_missed_frame_threshold: read(
                &lookup,
                "GHOST_MISSED_FRAME_THRESHOLD",
                defaults.tracker.ghost_missed_frame_threshold,
            )?,
            ghost_expiry,
            class_gated: read(&lookup, "CLASS_GATED", defaults.tracker.class_gated)?,
        };

        let selector = SelectorPolicy {
            prefer_ghost_continuity: read(
                &lookup,
                "PREFER_GHOST_CONTINUITY",
                defaults.selector.prefer_ghost_continuity,
            )?,
        };

        let controller = ControllerConfig {
            kp_steer: read(&lookup, "KP_STEER", defaults.controller.kp_steer)?,
            kp_throttle: read(&lookup, "KP_THROTTLE", defaults.controller.kp_throttle)?,
            target_width_ratio: read(
                &lookup,
                "TARGET_WIDTH_RATIO",
                defaults.controller.target_width_ratio,
            )?,
            output_limit: read(&lookup, "OUTPUT_LIMIT", defaults.controller.output_limit)?,
        };

        let target_classes = match lookup("TARGET_CLASSES") {
            Some(raw) => raw
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            None => defaults.filter.target_classes.clone(),
        };

        let filter = DetectionFilterConfig {
            target_classes,
            min_confidence: read(&lookup, "MIN_CONFIDENCE", defaults.filter.min_confidence)?,
            min_box_size: read(&lookup, "MIN_BOX_SIZE", defaults.filter.min_box_size)?,
            border_margin: read(&lookup, "BORDER_MARGIN", defaults.filter.border_margin)?,
        };

        let config = FollowerConfig {
            tracker,
            selector,
            controller,
            filter,
            filter_enabled: read(&lookup, "FILTER_DETECTIONS", defaults.filter_enabled)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let distance = self.tracker.max_tracking_distance;
        ensure(
            distance.is_finite() && distance > 0.0,
            "MAX_TRACKING_DISTANCE",
            "must be a positive number of pixels",
        )?;

        if let GhostExpiry::Time { frame_rate, .. } = self.tracker.ghost_expiry {
            ensure(
                frame_rate.is_finite() && frame_rate > 0.0,
                "FRAME_RATE",
                "must be positive",
            )?;
        }

        let ratio = self.controller.target_width_ratio;
        ensure(
            ratio.is_finite() && ratio > 0.0 && ratio <= 1.0,
            "TARGET_WIDTH_RATIO",
            "must be in (0, 1]",
        )?;

        for (key, gain) in [
            ("KP_STEER", self.controller.kp_steer),
            ("KP_THROTTLE", self.controller.kp_throttle),
        ] {
            ensure(gain.is_finite() && gain >= 0.0, key, "gain must be finite and non-negative")?;
        }

        let limit = self.controller.output_limit;
        ensure(limit.is_finite() && limit > 0.0, "OUTPUT_LIMIT", "must be positive")?;

        ensure(
            self.filter.min_confidence.is_finite(),
            "MIN_CONFIDENCE",
            "must be finite",
        )?;
        ensure(
            self.filter.min_box_size.is_finite() && self.filter.min_box_size >= 0.0,
            "MIN_BOX_SIZE",
            "must be non-negative",
        )?;
        ensure(
            self.filter.border_margin.is_finite() && self.filter.border_margin >= 0.0,
            "BORDER_MARGIN",
            "must be non-negative",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = FollowerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.tracker.max_tracking_distance, 400.0);
        assert_eq!(config.tracker.ghost_missed_frame_threshold, 10);
        assert_eq!(config.tracker.ghost_expiry.as_frames(), 150);
        assert!(config.selector.prefer_ghost_continuity);
        assert_eq!(config.controller.target_width_ratio, 0.4);
        assert!(config.filter_enabled);
        assert_eq!(config.filter.target_classes.len(), 6);
    }

    #[test]
    fn overrides_are_applied() {
        let config = FollowerConfig::from_lookup(lookup(&[
            ("MAX_TRACKING_DISTANCE", "250"),
            ("GHOST_EXPIRY_FRAMES", "42"),
            ("PREFER_GHOST_CONTINUITY", "false"),
            ("KP_STEER", "1.2"),
            ("TARGET_CLASSES", "cup, sports ball ,"),
            ("FILTER_DETECTIONS", "false"),
        ]))
        .unwrap();

        assert_eq!(config.tracker.max_tracking_distance, 250.0);
        assert_eq!(config.tracker.ghost_expiry, GhostExpiry::Frames(42));
        assert!(!config.selector.prefer_ghost_continuity);
        assert_eq!(config.controller.kp_steer, 1.2);
        assert_eq!(config.filter.target_classes, vec!["cup", "sports ball"]);
        assert!(!config.filter_enabled);
    }

    #[test]
    fn unparsable_value_is_an_error() {
        let err = FollowerConfig::from_lookup(lookup(&[("KP_THROTTLE", "fast")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "KP_THROTTLE", .. }));
    }

    #[test]
    fn out_of_range_values_rejected() {
        let err = FollowerConfig::from_lookup(lookup(&[("TARGET_WIDTH_RATIO", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "TARGET_WIDTH_RATIO", .. }));

        let err = FollowerConfig::from_lookup(lookup(&[("FRAME_RATE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "FRAME_RATE", .. }));

        let err = FollowerConfig::from_lookup(lookup(&[("GHOST_EXPIRY_SECS", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "GHOST_EXPIRY_SECS", .. }));

        // Finite but too large for a Duration
        let err = FollowerConfig::from_lookup(lookup(&[("GHOST_EXPIRY_SECS", "1e300")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "GHOST_EXPIRY_SECS", .. }));
    }
}
