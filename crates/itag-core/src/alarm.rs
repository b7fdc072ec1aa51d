//! Proximity alarm range configuration and trigger policy.
//!
//! The policy is a pure predicate over an estimated distance and a
//! [`RangeConfig`]; it carries no hysteresis. Flap suppression comes
//! from the batch cadence of the smoothing window, and the session
//! only ever arms the alarm here. It stays armed until the user
//! disables it.

use serde::{Deserialize, Serialize};

use crate::distance::UNKNOWN_DISTANCE;

/// Allowed distance band for the proximity alarm, in meters.
///
/// The invariant `min_range < max_range` is maintained by the setters,
/// which clamp an adjustment against the opposite bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeConfig {
    min_range: u32,
    max_range: u32,
    /// When false the policy never fires, regardless of distance.
    pub enabled: bool,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            min_range: 1,
            max_range: 10,
            enabled: false,
        }
    }
}

impl RangeConfig {
    /// Create a config; `min` is clamped below `max`.
    #[must_use]
    pub fn new(min: u32, max: u32, enabled: bool) -> Self {
        let max = max.max(1);
        Self {
            min_range: min.min(max - 1),
            max_range: max,
            enabled,
        }
    }

    /// Lower bound, meters.
    #[must_use]
    pub fn min_range(&self) -> u32 {
        self.min_range
    }

    /// Upper bound, meters.
    #[must_use]
    pub fn max_range(&self) -> u32 {
        self.max_range
    }

    /// Set the lower bound, clamped to stay below the upper bound.
    pub fn set_min_range(&mut self, min: u32) {
        self.min_range = min.min(self.max_range - 1);
    }

    /// Set the upper bound, clamped to stay above the lower bound.
    pub fn set_max_range(&mut self, max: u32) {
        self.max_range = max.max(self.min_range + 1);
    }
}

// Deserialization goes through the clamping constructor so a
// hand-edited config cannot break the `min < max` invariant.
impl<'de> Deserialize<'de> for RangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            min_range: u32,
            max_range: u32,
            enabled: bool,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(RangeConfig::new(raw.min_range, raw.max_range, raw.enabled))
    }
}

/// Whether the alarm should trigger for an estimated distance.
///
/// Returns `false` when the policy is disabled or the distance is the
/// unknown sentinel; otherwise true iff the distance falls outside
/// `[min_range, max_range]`.
#[must_use]
pub fn should_trigger(distance: f64, config: &RangeConfig) -> bool {
    if !config.enabled || distance == UNKNOWN_DISTANCE {
        return false;
    }
    distance < f64::from(config.min_range) || distance > f64::from(config.max_range)
}
