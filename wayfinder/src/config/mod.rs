//! Persistent configuration file.
//!
//! Settings live in an INI file under the user config directory
//! (`wayfinder/wayfinder.ini`). Every recognised option has a default;
//! a missing file or a missing key falls back silently, an unreadable
//! file is an error.

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Configuration loading and saving failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or written.
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid INI.
    #[error("failed to parse config file: {0}")]
    Parse(String),

    /// No user config directory on this platform.
    #[error("no user config directory available")]
    NoConfigDir,
}

/// Path of the user configuration file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(base.join("wayfinder").join("wayfinder.ini"))
}

/// `[navigation]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationSection {
    /// Arrival radius around a step end-point, in meters.
    pub step_arrival_threshold_m: f64,
    /// Base deviation threshold in meters.
    pub deviation_threshold_m: f64,
    /// Minimum interval between reroute triggers, in milliseconds.
    pub reroute_cooldown_ms: u64,
    /// Heading look-ahead distance, in meters.
    pub lookahead_distance_m: f64,
    /// Half-width of the sliding segment-match window.
    pub sliding_window_segments: usize,
    /// Manual map override duration, in milliseconds.
    pub manual_override_timeout_ms: u64,
    /// Distance travelled before the speed limit is refetched.
    pub speed_limit_refresh_m: f64,
}

impl Default for NavigationSection {
    fn default() -> Self {
        Self {
            step_arrival_threshold_m: crate::engine::DEFAULT_STEP_ARRIVAL_THRESHOLD_M,
            deviation_threshold_m: crate::engine::DEFAULT_DEVIATION_THRESHOLD_M,
            reroute_cooldown_ms: crate::engine::DEFAULT_REROUTE_COOLDOWN_MS,
            lookahead_distance_m: crate::geo::DEFAULT_LOOKAHEAD_M,
            sliding_window_segments: crate::geo::DEFAULT_WINDOW_SEGMENTS,
            manual_override_timeout_ms: crate::engine::DEFAULT_MANUAL_OVERRIDE_TIMEOUT_MS,
            speed_limit_refresh_m: crate::engine::DEFAULT_SPEED_LIMIT_REFRESH_M,
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSection {
    /// Maximum fetches in flight.
    pub max_requests: usize,
    /// Uniform delay between dispatches, in milliseconds.
    pub request_delay_ms: u64,
    /// Maximum attempts per fetch (including the first).
    pub retry_attempts: u32,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_requests: crate::scheduler::DEFAULT_MAX_IN_FLIGHT,
            request_delay_ms: crate::scheduler::DEFAULT_DISPATCH_DELAY_MS,
            retry_attempts: crate::scheduler::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// `[advisory]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorySection {
    /// Eco tip cooldown, in seconds.
    pub eco_cooldown_s: u64,
    /// Step reminder cooldown, in seconds.
    pub step_reminder_cooldown_s: u64,
    /// Speed warning hold, in seconds.
    pub speed_warning_hold_s: u64,
    /// Margin above the limit before warning, in km/h.
    pub speed_tolerance_kmh: f64,
    /// Minimum absolute slope for eco tips, in percent.
    pub slope_threshold_percent: f64,
    /// Reminder distance to the next maneuver, in meters.
    pub reminder_distance_m: f64,
}

impl Default for AdvisorySection {
    fn default() -> Self {
        Self {
            eco_cooldown_s: crate::advisory::DEFAULT_ECO_COOLDOWN_S,
            step_reminder_cooldown_s: crate::advisory::DEFAULT_STEP_REMINDER_COOLDOWN_S,
            speed_warning_hold_s: crate::advisory::DEFAULT_SPEED_WARNING_HOLD_S,
            speed_tolerance_kmh: crate::advisory::DEFAULT_SPEED_TOLERANCE_KMH,
            slope_threshold_percent: crate::advisory::DEFAULT_SLOPE_THRESHOLD_PERCENT,
            reminder_distance_m: crate::advisory::DEFAULT_REMINDER_DISTANCE_M,
        }
    }
}

/// `[providers]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvidersSection {
    /// OSRM-compatible routing endpoint.
    pub osrm_url: String,
    /// Open-elevation-compatible endpoint.
    pub elevation_url: String,
    /// Overpass endpoint for speed limits.
    pub overpass_url: String,
    /// Nominatim endpoint for geocoding.
    pub nominatim_url: String,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            osrm_url: crate::provider::DEFAULT_OSRM_BASE.to_string(),
            elevation_url: crate::provider::DEFAULT_ELEVATION_BASE.to_string(),
            overpass_url: crate::provider::DEFAULT_OVERPASS_BASE.to_string(),
            nominatim_url: crate::provider::DEFAULT_NOMINATIM_BASE.to_string(),
        }
    }
}

/// Typed view of the INI configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    /// Navigation thresholds and timers.
    pub navigation: NavigationSection,
    /// Request scheduler limits.
    pub scheduler: SchedulerSection,
    /// Advisory cooldowns and thresholds.
    pub advisory: AdvisorySection,
    /// Backend endpoints.
    pub providers: ProvidersSection,
}

impl ConfigFile {
    /// Loads from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path()?)
    }

    /// Loads from an explicit path, falling back to defaults for a
    /// missing file or missing keys.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(io) => ConfigError::Io(io),
            ini::Error::Parse(p) => ConfigError::Parse(p.to_string()),
        })?;
        let mut config = Self::default();
        config.apply(&ini);
        Ok(config)
    }

    /// Saves to the default location, creating parent directories.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path()?)
    }

    /// Saves to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some("navigation"))
            .set(
                "step_arrival_threshold_m",
                self.navigation.step_arrival_threshold_m.to_string(),
            )
            .set(
                "deviation_threshold_m",
                self.navigation.deviation_threshold_m.to_string(),
            )
            .set(
                "reroute_cooldown_ms",
                self.navigation.reroute_cooldown_ms.to_string(),
            )
            .set(
                "lookahead_distance_m",
                self.navigation.lookahead_distance_m.to_string(),
            )
            .set(
                "sliding_window_segments",
                self.navigation.sliding_window_segments.to_string(),
            )
            .set(
                "manual_override_timeout_ms",
                self.navigation.manual_override_timeout_ms.to_string(),
            )
            .set(
                "speed_limit_refresh_m",
                self.navigation.speed_limit_refresh_m.to_string(),
            );
        ini.with_section(Some("scheduler"))
            .set("max_requests", self.scheduler.max_requests.to_string())
            .set(
                "request_delay_ms",
                self.scheduler.request_delay_ms.to_string(),
            )
            .set("retry_attempts", self.scheduler.retry_attempts.to_string());
        ini.with_section(Some("advisory"))
            .set("eco_cooldown_s", self.advisory.eco_cooldown_s.to_string())
            .set(
                "step_reminder_cooldown_s",
                self.advisory.step_reminder_cooldown_s.to_string(),
            )
            .set(
                "speed_warning_hold_s",
                self.advisory.speed_warning_hold_s.to_string(),
            )
            .set(
                "speed_tolerance_kmh",
                self.advisory.speed_tolerance_kmh.to_string(),
            )
            .set(
                "slope_threshold_percent",
                self.advisory.slope_threshold_percent.to_string(),
            )
            .set(
                "reminder_distance_m",
                self.advisory.reminder_distance_m.to_string(),
            );
        ini.with_section(Some("providers"))
            .set("osrm_url", self.providers.osrm_url.clone())
            .set("elevation_url", self.providers.elevation_url.clone())
            .set("overpass_url", self.providers.overpass_url.clone())
            .set("nominatim_url", self.providers.nominatim_url.clone());

        ini.write_to_file(path)?;
        Ok(())
    }

    fn apply(&mut self, ini: &Ini) {
        let nav = &mut self.navigation;
        read(ini, "navigation", "step_arrival_threshold_m", &mut nav.step_arrival_threshold_m);
        read(ini, "navigation", "deviation_threshold_m", &mut nav.deviation_threshold_m);
        read(ini, "navigation", "reroute_cooldown_ms", &mut nav.reroute_cooldown_ms);
        read(ini, "navigation", "lookahead_distance_m", &mut nav.lookahead_distance_m);
        read(ini, "navigation", "sliding_window_segments", &mut nav.sliding_window_segments);
        read(ini, "navigation", "manual_override_timeout_ms", &mut nav.manual_override_timeout_ms);
        read(ini, "navigation", "speed_limit_refresh_m", &mut nav.speed_limit_refresh_m);

        let sched = &mut self.scheduler;
        read(ini, "scheduler", "max_requests", &mut sched.max_requests);
        read(ini, "scheduler", "request_delay_ms", &mut sched.request_delay_ms);
        read(ini, "scheduler", "retry_attempts", &mut sched.retry_attempts);

        let adv = &mut self.advisory;
        read(ini, "advisory", "eco_cooldown_s", &mut adv.eco_cooldown_s);
        read(ini, "advisory", "step_reminder_cooldown_s", &mut adv.step_reminder_cooldown_s);
        read(ini, "advisory", "speed_warning_hold_s", &mut adv.speed_warning_hold_s);
        read(ini, "advisory", "speed_tolerance_kmh", &mut adv.speed_tolerance_kmh);
        read(ini, "advisory", "slope_threshold_percent", &mut adv.slope_threshold_percent);
        read(ini, "advisory", "reminder_distance_m", &mut adv.reminder_distance_m);

        let prov = &mut self.providers;
        if let Some(v) = ini.get_from(Some("providers"), "osrm_url") {
            prov.osrm_url = v.to_string();
        }
        if let Some(v) = ini.get_from(Some("providers"), "elevation_url") {
            prov.elevation_url = v.to_string();
        }
        if let Some(v) = ini.get_from(Some("providers"), "overpass_url") {
            prov.overpass_url = v.to_string();
        }
        if let Some(v) = ini.get_from(Some("providers"), "nominatim_url") {
            prov.nominatim_url = v.to_string();
        }
    }
}

/// Overwrites `target` with the parsed value when the key is present
/// and parseable; warns and keeps the default otherwise.
fn read<T: std::str::FromStr>(ini: &Ini, section: &str, key: &str, target: &mut T) {
    let Some(raw) = ini.get_from(Some(section), key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => warn!(section, key, value = raw, "Ignoring unparseable config value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wayfinder.ini");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[navigation]").unwrap();
        writeln!(file, "deviation_threshold_m = 50").unwrap();
        writeln!(file, "[scheduler]").unwrap();
        writeln!(file, "max_requests = 4").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.navigation.deviation_threshold_m, 50.0);
        assert_eq!(config.scheduler.max_requests, 4);
        // Untouched keys keep their defaults.
        assert_eq!(
            config.navigation.step_arrival_threshold_m,
            NavigationSection::default().step_arrival_threshold_m
        );
        assert_eq!(config.providers, ProvidersSection::default());
    }

    #[test]
    fn unparseable_value_keeps_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wayfinder.ini");
        std::fs::write(&path, "[scheduler]\nmax_requests = lots\n").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(
            config.scheduler.max_requests,
            SchedulerSection::default().max_requests
        );
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("wayfinder.ini");

        let mut config = ConfigFile::default();
        config.navigation.reroute_cooldown_ms = 9000;
        config.advisory.eco_cooldown_s = 45;
        config.providers.osrm_url = "http://localhost:5000".to_string();
        config.save_to(&path).unwrap();

        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
