//! Application configuration.
//!
//! `NavConfig` combines every component configuration needed to
//! bootstrap the application. It can be built from defaults, from the
//! user's INI file, or programmatically via the builders.

use std::time::Duration;

use crate::advisory::AdvisoryConfig;
use crate::config::ConfigFile;
use crate::engine::EngineConfig;
use crate::provider::{
    DEFAULT_ELEVATION_BASE, DEFAULT_NOMINATIM_BASE, DEFAULT_OSRM_BASE, DEFAULT_OVERPASS_BASE,
};
use crate::scheduler::{RetryPolicy, SchedulerConfig};

/// Backend endpoints.
#[derive(Clone, Debug)]
pub struct ProviderEndpoints {
    /// OSRM-compatible routing endpoint.
    pub osrm_url: String,
    /// Open-elevation-compatible endpoint.
    pub elevation_url: String,
    /// Overpass endpoint for speed limits.
    pub overpass_url: String,
    /// Nominatim endpoint for geocoding.
    pub nominatim_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            osrm_url: DEFAULT_OSRM_BASE.to_string(),
            elevation_url: DEFAULT_ELEVATION_BASE.to_string(),
            overpass_url: DEFAULT_OVERPASS_BASE.to_string(),
            nominatim_url: DEFAULT_NOMINATIM_BASE.to_string(),
        }
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Default)]
pub struct NavConfig {
    /// Navigation engine thresholds and timers.
    pub engine: EngineConfig,

    /// Advisory cooldowns and thresholds.
    pub advisory: AdvisoryConfig,

    /// Request scheduler limits.
    pub scheduler: SchedulerConfig,

    /// Backend endpoints.
    pub endpoints: ProviderEndpoints,
}

impl NavConfig {
    /// Builds the application config from a loaded configuration file.
    ///
    /// Keeps the translation from file keys to component configs in
    /// one place rather than scattered in CLI code.
    pub fn from_config_file(file: &ConfigFile) -> Self {
        let nav = &file.navigation;
        let engine = EngineConfig {
            step_arrival_threshold_m: nav.step_arrival_threshold_m,
            deviation_threshold_m: nav.deviation_threshold_m,
            reroute_cooldown: Duration::from_millis(nav.reroute_cooldown_ms),
            lookahead_distance_m: nav.lookahead_distance_m,
            window_segments: nav.sliding_window_segments,
            manual_override_timeout: Duration::from_millis(nav.manual_override_timeout_ms),
            speed_limit_refresh_m: nav.speed_limit_refresh_m,
        };

        let adv = &file.advisory;
        let advisory = AdvisoryConfig {
            eco_cooldown: Duration::from_secs(adv.eco_cooldown_s),
            step_reminder_cooldown: Duration::from_secs(adv.step_reminder_cooldown_s),
            speed_warning_hold: Duration::from_secs(adv.speed_warning_hold_s),
            speed_tolerance_kmh: adv.speed_tolerance_kmh,
            slope_threshold_percent: adv.slope_threshold_percent,
            reminder_distance_m: adv.reminder_distance_m,
        };

        let sched = &file.scheduler;
        let scheduler = SchedulerConfig {
            max_in_flight: sched.max_requests,
            dispatch_delay: Duration::from_millis(sched.request_delay_ms),
            retry: RetryPolicy::fixed(
                sched.retry_attempts,
                Duration::from_millis(sched.request_delay_ms),
            ),
            ..SchedulerConfig::default()
        };

        let prov = &file.providers;
        let endpoints = ProviderEndpoints {
            osrm_url: prov.osrm_url.clone(),
            elevation_url: prov.elevation_url.clone(),
            overpass_url: prov.overpass_url.clone(),
            nominatim_url: prov.nominatim_url.clone(),
        };

        Self {
            engine,
            advisory,
            scheduler,
            endpoints,
        }
    }

    /// Set the base deviation threshold.
    pub fn with_deviation_threshold(mut self, meters: f64) -> Self {
        self.engine.deviation_threshold_m = meters;
        self
    }

    /// Set the maximum number of fetches in flight.
    pub fn with_max_requests(mut self, max: usize) -> Self {
        self.scheduler.max_in_flight = max;
        self
    }

    /// Set the OSRM routing endpoint.
    pub fn with_osrm_url(mut self, url: impl Into<String>) -> Self {
        self.endpoints.osrm_url = url.into();
        self
    }
}
