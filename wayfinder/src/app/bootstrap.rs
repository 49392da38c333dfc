//! Application bootstrap and run loop.
//!
//! `NavApp` wires the engine, the request scheduler and the provider
//! adapters together and owns the single event-processing loop:
//!
//! ```text
//! NavHandle ──commands/fixes──► NavApp::run ──events──► consumer
//!                                  │   ▲
//!                          requests│   │completions
//!                                  ▼   │
//!                            RequestScheduler ──► providers (HTTP)
//! ```
//!
//! The engine is never shared: commands, fixes and fetch completions
//! are serialized through the loop, so trip state sees one mutation at
//! a time. External observers read the published status snapshot.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{NavConfig, ProviderEndpoints};
use super::error::AppError;
use crate::engine::{EngineOutput, FetchRequest, NavEngine, NavEvent, NavStatus, PositionFix};
use crate::geo::Point;
use crate::provider::{
    ElevationProvider, GeocodeProvider, NominatimGeocoder, OpenElevationProvider, OsrmRouter,
    OverpassSpeedLimits, ProviderError, ReqwestClient, RoutingProvider, SpeedLimitProvider,
};
use crate::scheduler::{
    FetchPayload, FetchTask, RequestPurpose, RequestScheduler, ScheduledRequest, SchedulerHandle,
};
use crate::telemetry::NavMetrics;

/// Default capacity for the command/fix input channel.
const INPUT_CHANNEL_CAPACITY: usize = 64;

/// Default capacity for the outgoing event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Commands a consumer can send into the run loop.
#[derive(Debug, Clone)]
pub enum NavCommand {
    /// Start a multi-stop journey; `stops` is the start position
    /// followed by each destination.
    StartChain {
        /// Stops in visiting order, with labels.
        stops: Vec<(Point, String)>,
    },
    /// Start a single-leg journey.
    SelectDestination {
        /// Start position.
        origin: Point,
        /// Destination position.
        destination: Point,
        /// Display label for the destination.
        label: String,
    },
    /// Commit the previewed route and begin navigating.
    ApprovePreview,
    /// Discard the preview.
    CancelPreview,
    /// Abandon the journey.
    Stop,
    /// The consumer is panning the map manually.
    ManualOverride,
}

enum AppInput {
    Command(NavCommand),
    Fix(PositionFix),
}

/// The provider adapters the application fetches through.
pub struct Providers {
    /// Route fetches.
    pub routing: Arc<dyn RoutingProvider>,
    /// Elevation profile fetches.
    pub elevation: Arc<dyn ElevationProvider>,
    /// Speed limit fetches.
    pub speed_limits: Arc<dyn SpeedLimitProvider>,
    /// Forward geocoding.
    pub geocode: Arc<dyn GeocodeProvider>,
}

impl Providers {
    /// Builds HTTP-backed providers against the configured endpoints.
    pub fn http(endpoints: &ProviderEndpoints) -> Result<Self, AppError> {
        let http = Arc::new(ReqwestClient::new()?);
        Ok(Self {
            routing: Arc::new(OsrmRouter::new(&endpoints.osrm_url, Arc::clone(&http))),
            elevation: Arc::new(OpenElevationProvider::new(
                &endpoints.elevation_url,
                Arc::clone(&http),
            )),
            speed_limits: Arc::new(OverpassSpeedLimits::new(
                &endpoints.overpass_url,
                Arc::clone(&http),
            )),
            geocode: Arc::new(NominatimGeocoder::new(&endpoints.nominatim_url, http)),
        })
    }
}

/// Cloneable handle for talking to a running [`NavApp`].
#[derive(Clone)]
pub struct NavHandle {
    input_tx: mpsc::Sender<AppInput>,
    status: Arc<RwLock<NavStatus>>,
    metrics: Arc<NavMetrics>,
}

impl NavHandle {
    /// Sends a command into the run loop.
    pub async fn command(&self, command: NavCommand) -> Result<(), AppError> {
        self.input_tx
            .send(AppInput::Command(command))
            .await
            .map_err(|_| AppError::Stopped)
    }

    /// Feeds one position fix into the run loop.
    pub async fn fix(&self, fix: PositionFix) -> Result<(), AppError> {
        self.input_tx
            .send(AppInput::Fix(fix))
            .await
            .map_err(|_| AppError::Stopped)
    }

    /// Latest published status snapshot.
    pub fn status(&self) -> NavStatus {
        self.status.read().clone()
    }

    /// Shared metrics counters.
    pub fn metrics(&self) -> &NavMetrics {
        &self.metrics
    }
}

/// The assembled application, ready to run.
pub struct NavApp {
    engine: NavEngine,
    scheduler: RequestScheduler,
    scheduler_handle: SchedulerHandle,
    input_rx: mpsc::Receiver<AppInput>,
    completion_rx: mpsc::Receiver<crate::scheduler::FetchCompleted>,
    event_tx: mpsc::Sender<NavEvent>,
    status: Arc<RwLock<NavStatus>>,
    providers: Providers,
}

impl NavApp {
    /// Assembles the application.
    ///
    /// Returns the app (to be driven with [`NavApp::run`]), a handle
    /// for commands and fixes, and the event stream for consumers.
    pub fn new(
        config: NavConfig,
        providers: Providers,
        metrics: Arc<NavMetrics>,
    ) -> (Self, NavHandle, mpsc::Receiver<NavEvent>) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::channel(config.scheduler.channel_capacity);

        let (scheduler, scheduler_handle) = RequestScheduler::new(
            config.scheduler.clone(),
            completion_tx,
            Arc::clone(&metrics),
        );
        let engine = NavEngine::new(
            config.engine.clone(),
            config.advisory.clone(),
            Arc::clone(&metrics),
        );
        let status = Arc::new(RwLock::new(engine.status()));

        let handle = NavHandle {
            input_tx,
            status: Arc::clone(&status),
            metrics,
        };
        let app = Self {
            engine,
            scheduler,
            scheduler_handle,
            input_rx,
            completion_rx,
            event_tx,
            status,
            providers,
        };
        (app, handle, event_rx)
    }

    /// Runs the navigation loop until shutdown is signalled.
    pub async fn run(self, shutdown: CancellationToken) {
        let Self {
            mut engine,
            scheduler,
            scheduler_handle,
            mut input_rx,
            mut completion_rx,
            event_tx,
            status,
            providers,
        } = self;

        tokio::spawn(scheduler.run(shutdown.clone()));
        info!("Navigation loop starting");

        loop {
            let output = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Navigation loop shutting down");
                    break;
                }

                completed = completion_rx.recv() => match completed {
                    Some(completed) => engine.apply_fetch(completed),
                    None => break,
                },

                input = input_rx.recv() => match input {
                    Some(AppInput::Command(command)) => apply_command(&mut engine, command),
                    Some(AppInput::Fix(fix)) => engine.handle_fix(&fix, Instant::now()),
                    None => {
                        debug!("Input channel closed, navigation loop stopping");
                        break;
                    }
                },
            };

            *status.write() = engine.status();
            dispatch(output, &event_tx, &scheduler_handle, &providers).await;
        }
    }
}

fn apply_command(engine: &mut NavEngine, command: NavCommand) -> EngineOutput {
    match command {
        NavCommand::StartChain { stops } => engine.start_chain(&stops),
        NavCommand::SelectDestination {
            origin,
            destination,
            label,
        } => engine.select_destination(origin, destination, label),
        NavCommand::ApprovePreview => engine.approve_preview(),
        NavCommand::CancelPreview => {
            engine.cancel_preview();
            EngineOutput::empty()
        }
        NavCommand::Stop => {
            engine.stop();
            EngineOutput::empty()
        }
        NavCommand::ManualOverride => {
            engine.manual_override(Instant::now());
            EngineOutput::empty()
        }
    }
}

/// Forwards events to the consumer and turns fetch requests into
/// scheduler submissions.
async fn dispatch(
    output: EngineOutput,
    events: &mpsc::Sender<NavEvent>,
    scheduler: &SchedulerHandle,
    providers: &Providers,
) {
    for event in output.events {
        if events.send(event).await.is_err() {
            debug!("Event consumer gone, dropping event");
        }
    }

    for request in output.requests {
        let (task, purpose, token): (Box<dyn FetchTask>, RequestPurpose, u64) = match request {
            FetchRequest::Route {
                purpose,
                token,
                origin,
                destination,
            } => (
                Box::new(RouteFetchTask {
                    routing: Arc::clone(&providers.routing),
                    origin,
                    destination,
                }),
                purpose,
                token,
            ),
            FetchRequest::Elevation { token, points } => (
                Box::new(ElevationFetchTask {
                    elevation: Arc::clone(&providers.elevation),
                    points,
                }),
                RequestPurpose::Elevation,
                token,
            ),
            FetchRequest::SpeedLimit { token, point } => (
                Box::new(SpeedLimitFetchTask {
                    speed_limits: Arc::clone(&providers.speed_limits),
                    point,
                }),
                RequestPurpose::SpeedLimit,
                token,
            ),
        };

        let accepted = scheduler
            .submit(ScheduledRequest {
                task,
                purpose,
                token,
            })
            .await;
        if !accepted {
            warn!("Scheduler unavailable, dropping fetch request");
        }
    }
}

struct RouteFetchTask {
    routing: Arc<dyn RoutingProvider>,
    origin: Point,
    destination: Point,
}

impl FetchTask for RouteFetchTask {
    fn name(&self) -> &str {
        "FetchRoute"
    }

    fn run(&self) -> BoxFuture<'_, Result<FetchPayload, ProviderError>> {
        Box::pin(async move {
            let route = self.routing.fetch_route(self.origin, self.destination).await?;
            Ok(FetchPayload::Route(route))
        })
    }
}

struct ElevationFetchTask {
    elevation: Arc<dyn ElevationProvider>,
    points: Vec<Point>,
}

impl FetchTask for ElevationFetchTask {
    fn name(&self) -> &str {
        "FetchElevation"
    }

    fn run(&self) -> BoxFuture<'_, Result<FetchPayload, ProviderError>> {
        Box::pin(async move {
            let profile = self.elevation.fetch_profile(self.points.clone()).await?;
            Ok(FetchPayload::Elevation(profile))
        })
    }
}

struct SpeedLimitFetchTask {
    speed_limits: Arc<dyn SpeedLimitProvider>,
    point: Point,
}

impl FetchTask for SpeedLimitFetchTask {
    fn name(&self) -> &str {
        "FetchSpeedLimit"
    }

    fn run(&self) -> BoxFuture<'_, Result<FetchPayload, ProviderError>> {
        Box::pin(async move {
            let limit = self.speed_limits.fetch_speed_limit(self.point).await?;
            Ok(FetchPayload::SpeedLimit(limit))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Candidate;
    use crate::route::{straight_route, Route};
    use std::time::Duration;

    struct FixedRouter {
        route: Route,
    }

    impl RoutingProvider for FixedRouter {
        fn fetch_route(
            &self,
            _origin: Point,
            _destination: Point,
        ) -> BoxFuture<'_, Result<Route, ProviderError>> {
            Box::pin(async move { Ok(self.route.clone()) })
        }
    }

    struct FlatElevation;
    impl ElevationProvider for FlatElevation {
        fn fetch_profile(
            &self,
            points: Vec<Point>,
        ) -> BoxFuture<'_, Result<Vec<f64>, ProviderError>> {
            Box::pin(async move { Ok(vec![150.0; points.len()]) })
        }
    }

    struct NoLimits;
    impl SpeedLimitProvider for NoLimits {
        fn fetch_speed_limit(
            &self,
            _point: Point,
        ) -> BoxFuture<'_, Result<Option<f64>, ProviderError>> {
            Box::pin(async move { Ok(None) })
        }
    }

    struct NoGeocode;
    impl GeocodeProvider for NoGeocode {
        fn geocode(&self, _query: &str) -> BoxFuture<'_, Result<Vec<Candidate>, ProviderError>> {
            Box::pin(async move { Ok(Vec::new()) })
        }
    }

    fn test_providers(route: Route) -> Providers {
        Providers {
            routing: Arc::new(FixedRouter { route }),
            elevation: Arc::new(FlatElevation),
            speed_limits: Arc::new(NoLimits),
            geocode: Arc::new(NoGeocode),
        }
    }

    fn fast_config() -> NavConfig {
        let mut config = NavConfig::default();
        config.scheduler.dispatch_delay = Duration::from_millis(1);
        config
    }

    async fn next_event(events: &mut mpsc::Receiver<NavEvent>) -> NavEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed")
    }

    #[tokio::test]
    async fn preview_flows_through_scheduler_to_event_stream() {
        let origin = Point::new(48.0, 16.0);
        let route = straight_route(origin, 2, 500.0);
        let destination = route.destination().unwrap();

        let (app, handle, mut events) = NavApp::new(
            fast_config(),
            test_providers(route.clone()),
            Arc::new(NavMetrics::new()),
        );
        let shutdown = CancellationToken::new();
        tokio::spawn(app.run(shutdown.clone()));

        handle
            .command(NavCommand::SelectDestination {
                origin,
                destination,
                label: "work".to_string(),
            })
            .await
            .unwrap();

        let event = next_event(&mut events).await;
        assert!(matches!(event, NavEvent::PreviewReady { .. }));
        assert_eq!(handle.status().trip_label.as_deref(), Some("work"));

        handle.command(NavCommand::ApprovePreview).await.unwrap();
        for step in &route.steps {
            handle.fix(PositionFix::at(step.end)).await.unwrap();
        }

        // The two steps and the trip completion arrive in order,
        // interleaved with heading updates.
        let mut steps = Vec::new();
        let mut completed = false;
        while !completed {
            match next_event(&mut events).await {
                NavEvent::StepAdvanced { step_index } => steps.push(step_index),
                NavEvent::TripCompleted { .. } => completed = true,
                _ => {}
            }
        }
        assert_eq!(steps, vec![0, 1]);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn handle_reports_stopped_after_shutdown() {
        let origin = Point::new(48.0, 16.0);
        let (app, handle, _events) = NavApp::new(
            fast_config(),
            test_providers(straight_route(origin, 1, 100.0)),
            Arc::new(NavMetrics::new()),
        );
        let shutdown = CancellationToken::new();
        let join = tokio::spawn(app.run(shutdown.clone()));
        shutdown.cancel();
        join.await.unwrap();

        let result = handle.command(NavCommand::Stop).await;
        assert!(matches!(result, Err(AppError::Stopped)));
    }
}
