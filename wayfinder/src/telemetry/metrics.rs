//! Atomic counters for the navigation pipeline.

use super::snapshot::TelemetrySnapshot;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared across the engine and scheduler.
///
/// All methods are cheap and safe to call from any task.
#[derive(Debug, Default)]
pub struct NavMetrics {
    fixes_processed: AtomicU64,
    steps_advanced: AtomicU64,
    deviations_detected: AtomicU64,
    reroutes_started: AtomicU64,
    reroutes_completed: AtomicU64,
    reroutes_failed: AtomicU64,
    stale_results_dropped: AtomicU64,
    requests_cancelled: AtomicU64,
    requests_retried: AtomicU64,
    advisories_fired: AtomicU64,
    full_search_fallbacks: AtomicU64,
}

impl NavMetrics {
    /// Creates zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one processed position fix.
    pub fn fix_processed(&self) {
        self.fixes_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed step.
    pub fn step_advanced(&self) {
        self.steps_advanced.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a confirmed deviation.
    pub fn deviation_detected(&self) {
        self.deviations_detected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reroute fetch being started.
    pub fn reroute_started(&self) {
        self.reroutes_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reroute applied to the trip.
    pub fn reroute_completed(&self) {
        self.reroutes_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reroute fetch that failed permanently.
    pub fn reroute_failed(&self) {
        self.reroutes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a fetch result discarded for carrying an old token.
    pub fn stale_result_dropped(&self) {
        self.stale_results_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a queued request skipped after being superseded.
    pub fn request_cancelled(&self) {
        self.requests_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one retry attempt.
    pub fn request_retried(&self) {
        self.requests_retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a fired advisory.
    pub fn advisory_fired(&self) {
        self.advisories_fired.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a sliding-window miss that forced a full-route search.
    pub fn full_search_fallback(&self) {
        self.full_search_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            taken_at: chrono::Utc::now(),
            fixes_processed: self.fixes_processed.load(Ordering::Relaxed),
            steps_advanced: self.steps_advanced.load(Ordering::Relaxed),
            deviations_detected: self.deviations_detected.load(Ordering::Relaxed),
            reroutes_started: self.reroutes_started.load(Ordering::Relaxed),
            reroutes_completed: self.reroutes_completed.load(Ordering::Relaxed),
            reroutes_failed: self.reroutes_failed.load(Ordering::Relaxed),
            stale_results_dropped: self.stale_results_dropped.load(Ordering::Relaxed),
            requests_cancelled: self.requests_cancelled.load(Ordering::Relaxed),
            requests_retried: self.requests_retried.load(Ordering::Relaxed),
            advisories_fired: self.advisories_fired.load(Ordering::Relaxed),
            full_search_fallbacks: self.full_search_fallbacks.load(Ordering::Relaxed),
        }
    }
}
