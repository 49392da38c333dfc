//! Navigation state machine.
//!
//! The engine is the single owner of trip state. It consumes position
//! fixes and fetch completions one at a time, mutates the active trip,
//! and emits events plus fetch requests. It never performs I/O and
//! never blocks; asynchronous work is described as [`FetchRequest`]s
//! that the run loop hands to the scheduler, and rejoins the engine as
//! [`FetchCompleted`] events.
//!
//! # Architecture
//!
//! ```text
//! position fix ──► RouteMatcher ──► step arrival ──► deviation ──► advisories
//!                  (geo kernel)      (route model)    (reroute       (cooldowns)
//!                                                      trigger)
//!                                                        │
//!                                                        ▼
//!                                                  FetchRequest ──► scheduler
//!                                                        │
//! FetchCompleted ◄────────────────────────────────────────┘
//!   (token-checked, stale results dropped)
//! ```
//!
//! Per fix, arrival is checked before deviation and the two are
//! mutually exclusive: a rider exactly at a step boundary is never
//! simultaneously flagged off-route.

mod config;
mod events;

pub use config::{
    EngineConfig, DEFAULT_DEVIATION_THRESHOLD_M, DEFAULT_MANUAL_OVERRIDE_TIMEOUT_MS,
    DEFAULT_REROUTE_COOLDOWN_MS, DEFAULT_SPEED_LIMIT_REFRESH_M, DEFAULT_STEP_ARRIVAL_THRESHOLD_M,
};
pub use events::{EngineOutput, FetchRequest, NavEvent, PositionFix};

use crate::advisory::{AdvisoryConfig, AdvisoryContext, AdvisoryEngine, NextManeuver, RoadClass};
use crate::geo::{self, Point, RouteMatcher};
use crate::provider::ProviderError;
use crate::scheduler::{FetchCompleted, FetchPayload, RequestPurpose};
use crate::telemetry::NavMetrics;
use crate::trip::{CooldownKind, TripChain};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Trip lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NavState {
    /// No destination selected.
    Idle,
    /// A route is being previewed; no step is active.
    Preview,
    /// Actively guiding along the committed route.
    Navigating,
    /// A reroute fetch is outstanding; guidance continues on the last
    /// known route.
    Rerouting,
    /// The final step of the active trip completed.
    DestinationReached,
}

/// Read-only snapshot of engine state for external observers.
#[derive(Debug, Clone, Serialize)]
pub struct NavStatus {
    /// Current lifecycle state.
    pub state: NavState,
    /// Index of the active trip within its chain; stays at the last
    /// trip once the journey completes.
    pub trip_index: usize,
    /// Destination label of the active trip.
    pub trip_label: Option<String>,
    /// Index of the active step.
    pub step_index: Option<usize>,
    /// Distance to the destination from the last fix, in meters.
    pub remaining_distance_m: Option<f64>,
    /// Last known speed limit in km/h.
    pub speed_limit_kmh: Option<f64>,
    /// The speed limit is retained from an earlier position.
    pub speed_limit_stale: bool,
}

/// The navigation engine.
///
/// All mutation happens through `&mut self` on the single event
/// stream; nothing here is shared or locked.
pub struct NavEngine {
    config: EngineConfig,
    state: NavState,
    chain: TripChain,
    matcher: RouteMatcher,
    advisory: AdvisoryEngine,
    /// Elevations aligned index-for-index with the active route
    /// geometry; `None` degrades slope to 0.
    elevation: Option<Vec<f64>>,
    speed_limit_kmh: Option<f64>,
    speed_limit_stale: bool,
    last_limit_fetch_at: Option<Point>,
    manual_override_until: Option<Instant>,
    last_fix: Option<Point>,
    /// Highest sequence token issued across all trips. Keeps tokens
    /// globally monotonic so the scheduler's per-purpose supersession
    /// stays correct across trip boundaries.
    last_token: u64,
    metrics: Arc<NavMetrics>,
}

impl NavEngine {
    /// Creates an idle engine.
    pub fn new(
        config: EngineConfig,
        advisory_config: AdvisoryConfig,
        metrics: Arc<NavMetrics>,
    ) -> Self {
        let matcher = RouteMatcher::new(config.window_segments);
        Self {
            config,
            state: NavState::Idle,
            chain: TripChain::default(),
            matcher,
            advisory: AdvisoryEngine::new(advisory_config),
            elevation: None,
            speed_limit_kmh: None,
            speed_limit_stale: false,
            last_limit_fetch_at: None,
            manual_override_until: None,
            last_fix: None,
            last_token: 0,
            metrics,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NavState {
        self.state
    }

    /// Snapshot for external observers.
    pub fn status(&self) -> NavStatus {
        let trip = self.chain.active();
        let progress = trip.and_then(|t| t.progress.as_ref());
        NavStatus {
            state: self.state,
            trip_index: self.chain.active_index(),
            trip_label: trip.map(|t| t.label.clone()),
            step_index: progress.map(|p| p.current_step_index()),
            remaining_distance_m: match (progress, self.last_fix) {
                (Some(p), Some(fix)) => Some(p.remaining_distance_m(fix)),
                _ => None,
            },
            speed_limit_kmh: self.speed_limit_kmh,
            speed_limit_stale: self.speed_limit_stale,
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Starts a multi-stop journey and requests the first preview
    /// route.
    ///
    /// `stops` holds the start position followed by each destination.
    /// Replaces any journey in progress.
    pub fn start_chain(&mut self, stops: &[(Point, String)]) -> EngineOutput {
        let mut output = EngineOutput::empty();
        let chain = TripChain::through(stops);
        if chain.is_empty() {
            warn!("A journey needs at least two stops");
            return output;
        }

        self.reset_route_state();
        self.chain = chain;
        self.state = NavState::Preview;

        let last_token = self.last_token;
        if let Some(trip) = self.chain.active_mut() {
            trip.seed_token(last_token);
            let token = trip.bump_token();
            self.last_token = token;
            info!(destination = %trip.label, "Requesting preview route");
            output.requests.push(FetchRequest::Route {
                purpose: RequestPurpose::PreviewRoute,
                token,
                origin: trip.origin,
                destination: trip.destination,
            });
        }
        output
    }

    /// Starts a single-leg journey from `origin` to `destination`.
    pub fn select_destination(
        &mut self,
        origin: Point,
        destination: Point,
        label: impl Into<String>,
    ) -> EngineOutput {
        self.start_chain(&[
            (origin, "start".to_string()),
            (destination, label.into()),
        ])
    }

    /// Commits the previewed route and begins navigating.
    ///
    /// No-op unless a preview route has arrived.
    pub fn approve_preview(&mut self) -> EngineOutput {
        let mut output = EngineOutput::empty();
        if self.state != NavState::Preview {
            warn!(state = ?self.state, "Approve ignored outside preview");
            return output;
        }
        let Some(trip) = self.chain.active_mut() else {
            return output;
        };
        let Some(progress) = trip.progress.as_ref() else {
            warn!("No preview route to approve yet");
            return output;
        };

        let token = trip.token();
        let origin = trip.origin;
        let geometry = progress.route().geometry.clone();
        trip.cooldowns.reset();

        self.state = NavState::Navigating;
        self.matcher.reset();
        self.advisory.reset();
        self.elevation = None;
        self.last_limit_fetch_at = Some(origin);

        info!("Navigation started");
        output.requests.push(FetchRequest::Elevation {
            token,
            points: geometry,
        });
        output.requests.push(FetchRequest::SpeedLimit {
            token,
            point: origin,
        });
        output
    }

    /// Discards the preview and returns to idle.
    pub fn cancel_preview(&mut self) {
        if self.state == NavState::Preview {
            debug!("Preview cancelled");
            self.stop();
        }
    }

    /// Abandons the journey entirely.
    pub fn stop(&mut self) {
        self.state = NavState::Idle;
        self.chain = TripChain::default();
        self.reset_route_state();
    }

    /// Marks the map as manually panned.
    ///
    /// Heading output is suppressed until the override times out;
    /// navigation checks are unaffected.
    pub fn manual_override(&mut self, now: Instant) {
        debug!("Manual map override");
        self.manual_override_until = Some(now + self.config.manual_override_timeout);
    }

    // ========================================================================
    // Event processing
    // ========================================================================

    /// Processes one position fix.
    ///
    /// Order per fix: route match, heading, step arrival, deviation,
    /// advisories. Arrival and deviation are mutually exclusive.
    pub fn handle_fix(&mut self, fix: &PositionFix, now: Instant) -> EngineOutput {
        let mut output = EngineOutput::empty();
        if !matches!(self.state, NavState::Navigating | NavState::Rerouting) {
            return output;
        }

        self.metrics.fix_processed();
        self.last_fix = Some(fix.point);

        let override_active = self.manual_override_until.is_some_and(|until| now < until);
        let arrival_threshold = self.config.step_arrival_threshold_m;
        let deviation_threshold = RoadClass::from_speed_limit(self.speed_limit_kmh)
            .deviation_threshold_m(self.config.deviation_threshold_m);
        let in_rerouting = self.state == NavState::Rerouting;

        let Some(trip) = self.chain.active_mut() else {
            return output;
        };
        // A chained leg may still be waiting for its route.
        let Some(progress) = trip.progress.as_mut() else {
            return output;
        };

        let Some(matched) = self
            .matcher
            .nearest_route_distance(fix.point, &progress.route().geometry)
        else {
            return output;
        };
        if matched.full_search {
            debug!(distance_m = matched.distance_m, "Window miss, full route search");
            self.metrics.full_search_fallback();
        }

        if !override_active {
            if let Some(bearing_deg) = geo::look_ahead_bearing(
                &progress.route().geometry,
                matched.segment_index,
                matched.nearest,
                fix.point,
                self.config.lookahead_distance_m,
            ) {
                output.events.push(NavEvent::HeadingUpdated { bearing_deg });
            }
        }

        // Step arrival: consecutive steps sharing an end-point all
        // complete on the same fix.
        let mut arrived = false;
        while let Some(step) = progress.current_step() {
            if geo::haversine_distance(fix.point, step.end) >= arrival_threshold {
                break;
            }
            let step_index = step.index;
            progress.mark_step_completed(step_index);
            self.metrics.step_advanced();
            debug!(step = step_index, "Step completed");
            output.events.push(NavEvent::StepAdvanced { step_index });
            arrived = true;
        }

        if progress.is_finished() {
            let trip_index = trip.index;
            info!(trip = trip_index, destination = %trip.label, "Destination reached");
            output.events.push(NavEvent::TripCompleted { trip_index });
            self.state = NavState::DestinationReached;
            self.advance_chain(fix.point, &mut output);
            return output;
        }

        if !arrived
            && !in_rerouting
            && matched.distance_m > deviation_threshold
            && trip
                .cooldowns
                .ready(CooldownKind::Reroute, now, self.config.reroute_cooldown)
        {
            trip.cooldowns.touch(CooldownKind::Reroute, now);
            self.metrics.deviation_detected();
            warn!(
                distance_m = matched.distance_m,
                threshold_m = deviation_threshold,
                "Route deviation detected"
            );
            output.events.push(NavEvent::DeviationDetected {
                distance_m: matched.distance_m,
            });

            let token = trip.bump_token();
            self.last_token = token;
            self.state = NavState::Rerouting;
            self.metrics.reroute_started();
            output.events.push(NavEvent::RerouteStarted);
            output.requests.push(FetchRequest::Route {
                purpose: RequestPurpose::Reroute,
                token,
                origin: fix.point,
                destination: trip.destination,
            });
        }

        // The deviation block above needed the trip mutably; re-borrow
        // the cursor read-only for the advisory inputs.
        let Some(progress) = trip.progress.as_ref() else {
            return output;
        };
        let slope_percent = slope_percent_at(
            self.elevation.as_deref(),
            &progress.route().geometry,
            matched.segment_index,
        );
        let next_maneuver = progress.current_step().map(|step| NextManeuver {
            instruction: step.instruction.as_str(),
            distance_m: geo::haversine_distance(fix.point, step.end),
        });
        let ctx = AdvisoryContext {
            speed_kmh: fix.speed_kmh,
            speed_limit_kmh: self.speed_limit_kmh,
            speed_limit_stale: self.speed_limit_stale,
            slope_percent,
            next_maneuver,
        };
        for advisory in self.advisory.evaluate(&ctx, &mut trip.cooldowns, now) {
            self.metrics.advisory_fired();
            output.events.push(NavEvent::AdvisoryFired { advisory });
        }

        let needs_limit = match self.last_limit_fetch_at {
            None => true,
            Some(at) => geo::haversine_distance(at, fix.point) > self.config.speed_limit_refresh_m,
        };
        if needs_limit {
            self.last_limit_fetch_at = Some(fix.point);
            output.requests.push(FetchRequest::SpeedLimit {
                token: trip.token(),
                point: fix.point,
            });
        }

        output
    }

    /// Reconciles one fetch completion.
    ///
    /// This is the only place asynchronous results touch trip state.
    /// Route results carrying an old sequence token are dropped here
    /// even if the scheduler let them through.
    pub fn apply_fetch(&mut self, completed: FetchCompleted) -> EngineOutput {
        match completed.purpose {
            RequestPurpose::PreviewRoute | RequestPurpose::Reroute => {
                self.apply_route_fetch(completed)
            }
            RequestPurpose::Elevation => {
                self.apply_elevation(completed.result);
                EngineOutput::empty()
            }
            RequestPurpose::SpeedLimit => {
                self.apply_speed_limit(completed.result);
                EngineOutput::empty()
            }
            // Geocode results are consumed by the caller, not the
            // engine.
            RequestPurpose::Geocode => EngineOutput::empty(),
        }
    }

    fn apply_route_fetch(&mut self, completed: FetchCompleted) -> EngineOutput {
        let mut output = EngineOutput::empty();
        let state = self.state;
        let is_reroute = completed.purpose == RequestPurpose::Reroute;

        let Some(trip) = self.chain.active_mut() else {
            debug!("Route result with no active trip, ignoring");
            return output;
        };
        if !trip.token_is_current(completed.token) {
            debug!(
                token = completed.token,
                current = trip.token(),
                "Dropping stale route result"
            );
            self.metrics.stale_result_dropped();
            return output;
        }

        match completed.result {
            Ok(FetchPayload::Route(route)) => match state {
                NavState::Preview => {
                    info!(
                        steps = route.steps.len(),
                        distance_m = route.distance_m,
                        "Preview route ready"
                    );
                    trip.commit_route(route.clone());
                    output.events.push(NavEvent::PreviewReady { route });
                }
                NavState::Navigating | NavState::Rerouting => {
                    let token = trip.token();
                    trip.commit_route(route.clone());
                    self.matcher.reset();
                    self.advisory.reset();
                    self.elevation = None;
                    self.state = NavState::Navigating;
                    info!(steps = route.steps.len(), "Route replaced");
                    output.requests.push(FetchRequest::Elevation {
                        token,
                        points: route.geometry.clone(),
                    });
                    // A reroute replaces the route mid-guidance; a
                    // preview-purpose result here is the next chained
                    // leg coming online.
                    if is_reroute {
                        self.metrics.reroute_completed();
                        output.events.push(NavEvent::RerouteCompleted { route });
                    } else {
                        output.events.push(NavEvent::LegRouteReady { route });
                    }
                }
                _ => debug!(state = ?state, "Route result in unexpected state, ignoring"),
            },
            Ok(_) => debug!("Mismatched payload for route fetch, ignoring"),
            Err(err) => {
                warn!(error = %err, "Route fetch failed");
                output.events.push(NavEvent::RouteFetchFailed {
                    message: err.to_string(),
                });
                if state == NavState::Rerouting {
                    // Keep guiding on the last known route; the
                    // cooldown gates the next attempt.
                    self.state = NavState::Navigating;
                    if is_reroute {
                        self.metrics.reroute_failed();
                    }
                }
            }
        }
        output
    }

    fn apply_elevation(&mut self, result: Result<FetchPayload, ProviderError>) {
        match result {
            Ok(FetchPayload::Elevation(profile)) => {
                let geometry_len = self
                    .chain
                    .active()
                    .and_then(|t| t.progress.as_ref())
                    .map(|p| p.route().geometry.len());
                if geometry_len == Some(profile.len()) {
                    debug!(points = profile.len(), "Elevation profile applied");
                    self.elevation = Some(profile);
                } else {
                    debug!("Elevation profile does not match route geometry, ignoring");
                }
            }
            Ok(_) => debug!("Mismatched payload for elevation fetch, ignoring"),
            Err(err) => {
                debug!(error = %err, "Elevation fetch failed, slope tips disabled");
                self.elevation = None;
            }
        }
    }

    fn apply_speed_limit(&mut self, result: Result<FetchPayload, ProviderError>) {
        match result {
            Ok(FetchPayload::SpeedLimit(Some(limit_kmh))) => {
                debug!(limit_kmh, "Speed limit updated");
                self.speed_limit_kmh = Some(limit_kmh);
                self.speed_limit_stale = false;
            }
            Ok(FetchPayload::SpeedLimit(None)) => {
                // Unmapped road: retain the last known limit.
                self.speed_limit_stale = self.speed_limit_kmh.is_some();
            }
            Ok(_) => debug!("Mismatched payload for speed limit fetch, ignoring"),
            Err(err) => {
                debug!(error = %err, "Speed limit fetch failed, retaining last value");
                self.speed_limit_stale = self.speed_limit_kmh.is_some();
            }
        }
    }

    /// Activates the next chained trip, or goes idle.
    fn advance_chain(&mut self, position: Point, output: &mut EngineOutput) {
        match self.chain.advance() {
            Some(next_trip_index) => {
                info!(trip = next_trip_index, "Next leg activated");
                output.events.push(NavEvent::ChainAdvanced { next_trip_index });
                self.state = NavState::Navigating;
                self.matcher.reset();
                self.advisory.reset();
                self.elevation = None;

                let last_token = self.last_token;
                if let Some(next) = self.chain.active_mut() {
                    next.seed_token(last_token);
                    let token = next.bump_token();
                    self.last_token = token;
                    output.requests.push(FetchRequest::Route {
                        purpose: RequestPurpose::PreviewRoute,
                        token,
                        origin: position,
                        destination: next.destination,
                    });
                }
            }
            None => {
                info!("Journey complete");
                self.state = NavState::Idle;
            }
        }
    }

    fn reset_route_state(&mut self) {
        self.matcher.reset();
        self.advisory.reset();
        self.elevation = None;
        self.speed_limit_kmh = None;
        self.speed_limit_stale = false;
        self.last_limit_fetch_at = None;
        self.manual_override_until = None;
        self.last_fix = None;
    }
}

/// Slope of the matched segment in percent, signed uphill-positive.
///
/// Degrades to 0 whenever the profile is missing or misaligned.
fn slope_percent_at(profile: Option<&[f64]>, geometry: &[Point], segment_index: usize) -> f64 {
    let Some(profile) = profile else {
        return 0.0;
    };
    if profile.len() != geometry.len() || segment_index + 1 >= profile.len() {
        return 0.0;
    }
    let run = geo::haversine_distance(geometry[segment_index], geometry[segment_index + 1]);
    if run < 1.0 {
        return 0.0;
    }
    (profile[segment_index + 1] - profile[segment_index]) / run * 100.0
}
