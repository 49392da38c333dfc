//! Point-in-time copy of the navigation counters.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of [`NavMetrics`](super::NavMetrics) counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TelemetrySnapshot {
    /// Wall-clock time the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Position fixes processed by the engine.
    pub fixes_processed: u64,
    /// Steps marked completed.
    pub steps_advanced: u64,
    /// Deviations that crossed the threshold.
    pub deviations_detected: u64,
    /// Reroute fetches started.
    pub reroutes_started: u64,
    /// Reroutes applied to a trip.
    pub reroutes_completed: u64,
    /// Reroute fetches that failed permanently.
    pub reroutes_failed: u64,
    /// Fetch results dropped for carrying an old sequence token.
    pub stale_results_dropped: u64,
    /// Queued requests skipped after being superseded.
    pub requests_cancelled: u64,
    /// Retry attempts performed by the scheduler.
    pub requests_retried: u64,
    /// Advisories emitted.
    pub advisories_fired: u64,
    /// Sliding-window misses that forced a full-route search.
    pub full_search_fallbacks: u64,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            taken_at: DateTime::<Utc>::UNIX_EPOCH,
            fixes_processed: 0,
            steps_advanced: 0,
            deviations_detected: 0,
            reroutes_started: 0,
            reroutes_completed: 0,
            reroutes_failed: 0,
            stale_results_dropped: 0,
            requests_cancelled: 0,
            requests_retried: 0,
            advisories_fired: 0,
            full_search_fallbacks: 0,
        }
    }
}

impl TelemetrySnapshot {
    /// Reroute success ratio in [0, 1]; 1.0 when none started.
    pub fn reroute_success_rate(&self) -> f64 {
        if self.reroutes_started == 0 {
            return 1.0;
        }
        self.reroutes_completed as f64 / self.reroutes_started as f64
    }
}
