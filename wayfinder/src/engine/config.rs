//! Navigation engine configuration.

use crate::geo::{DEFAULT_LOOKAHEAD_M, DEFAULT_WINDOW_SEGMENTS};
use std::time::Duration;

/// Default arrival threshold around a step's end-point, in meters.
pub const DEFAULT_STEP_ARRIVAL_THRESHOLD_M: f64 = 30.0;

/// Default base deviation threshold, in meters.
///
/// Scaled up on faster road classes where carriageways are wider and
/// GPS offsets larger.
pub const DEFAULT_DEVIATION_THRESHOLD_M: f64 = 35.0;

/// Default minimum interval between reroute triggers, in milliseconds.
pub const DEFAULT_REROUTE_COOLDOWN_MS: u64 = 6000;

/// Default duration of a manual map override, in milliseconds.
pub const DEFAULT_MANUAL_OVERRIDE_TIMEOUT_MS: u64 = 4000;

/// Default distance travelled before the speed limit is refreshed, in
/// meters.
pub const DEFAULT_SPEED_LIMIT_REFRESH_M: f64 = 500.0;

/// Thresholds and timers for the navigation engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Arrival radius around a step's end-point, in meters.
    pub step_arrival_threshold_m: f64,

    /// Base deviation threshold in meters, before road-class scaling.
    pub deviation_threshold_m: f64,

    /// Minimum interval between reroute triggers.
    pub reroute_cooldown: Duration,

    /// Look-ahead distance for heading computation, in meters.
    pub lookahead_distance_m: f64,

    /// Half-width of the sliding segment-match window.
    pub window_segments: usize,

    /// How long a manual override suppresses heading output.
    pub manual_override_timeout: Duration,

    /// Distance travelled before the speed limit is refetched.
    pub speed_limit_refresh_m: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_arrival_threshold_m: DEFAULT_STEP_ARRIVAL_THRESHOLD_M,
            deviation_threshold_m: DEFAULT_DEVIATION_THRESHOLD_M,
            reroute_cooldown: Duration::from_millis(DEFAULT_REROUTE_COOLDOWN_MS),
            lookahead_distance_m: DEFAULT_LOOKAHEAD_M,
            window_segments: DEFAULT_WINDOW_SEGMENTS,
            manual_override_timeout: Duration::from_millis(DEFAULT_MANUAL_OVERRIDE_TIMEOUT_MS),
            speed_limit_refresh_m: DEFAULT_SPEED_LIMIT_REFRESH_M,
        }
    }
}

impl EngineConfig {
    /// Set the step arrival threshold.
    pub fn with_step_arrival_threshold(mut self, meters: f64) -> Self {
        self.step_arrival_threshold_m = meters;
        self
    }

    /// Set the base deviation threshold.
    pub fn with_deviation_threshold(mut self, meters: f64) -> Self {
        self.deviation_threshold_m = meters;
        self
    }

    /// Set the reroute cooldown.
    pub fn with_reroute_cooldown(mut self, cooldown: Duration) -> Self {
        self.reroute_cooldown = cooldown;
        self
    }

    /// Set the manual override timeout.
    pub fn with_manual_override_timeout(mut self, timeout: Duration) -> Self {
        self.manual_override_timeout = timeout;
        self
    }
}
