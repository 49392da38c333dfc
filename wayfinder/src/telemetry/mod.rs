//! Engine telemetry for observability.
//!
//! Lock-free atomic counters recorded by the engine and scheduler,
//! copied out as a point-in-time [`TelemetrySnapshot`] for display.
//!
//! ```text
//! Engine / Scheduler ─────► NavMetrics ─────► TelemetrySnapshot ─────► Views
//!                           (atomic counters)  (point-in-time copy)     (CLI, logs)
//! ```

mod metrics;
mod snapshot;

pub use metrics::NavMetrics;
pub use snapshot::TelemetrySnapshot;
