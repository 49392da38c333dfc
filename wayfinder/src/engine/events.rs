//! Engine input and output types.

use crate::advisory::Advisory;
use crate::geo::Point;
use crate::route::Route;
use crate::scheduler::RequestPurpose;

/// One GPS fix fed into the engine.
#[derive(Debug, Clone, Copy)]
pub struct PositionFix {
    /// Position of the fix.
    pub point: Point,
    /// Ground speed in km/h, if the receiver reported one.
    pub speed_kmh: Option<f64>,
}

impl PositionFix {
    /// Creates a fix without speed information.
    pub fn at(point: Point) -> Self {
        Self {
            point,
            speed_kmh: None,
        }
    }

    /// Attaches a ground speed.
    pub fn with_speed(mut self, kmh: f64) -> Self {
        self.speed_kmh = Some(kmh);
        self
    }
}

/// Events produced by the engine, consumed by rendering and speech
/// collaborators.
#[derive(Debug, Clone)]
pub enum NavEvent {
    /// A preview route arrived and is ready for approval.
    PreviewReady {
        /// The fetched route.
        route: Route,
    },
    /// The active step completed.
    StepAdvanced {
        /// Index of the completed step.
        step_index: usize,
    },
    /// The fix crossed the deviation threshold.
    DeviationDetected {
        /// Distance from the route, in meters.
        distance_m: f64,
    },
    /// A reroute fetch was enqueued.
    RerouteStarted,
    /// A new route replaced the old one after a deviation.
    RerouteCompleted {
        /// The replacement route.
        route: Route,
    },
    /// The next chained leg's route arrived and guidance switched to
    /// it.
    LegRouteReady {
        /// Route for the newly active leg.
        route: Route,
    },
    /// A route fetch failed permanently; the last known route stays
    /// active.
    RouteFetchFailed {
        /// Human-readable failure description.
        message: String,
    },
    /// An advisory fired.
    AdvisoryFired {
        /// The advisory and its payload.
        advisory: Advisory,
    },
    /// The active trip reached its destination.
    TripCompleted {
        /// Index of the completed trip within its chain.
        trip_index: usize,
    },
    /// The next trip in the chain activated.
    ChainAdvanced {
        /// Index of the newly active trip.
        next_trip_index: usize,
    },
    /// Fresh look-ahead heading for map rotation.
    HeadingUpdated {
        /// Bearing in degrees, [0, 360).
        bearing_deg: f64,
    },
}

/// A fetch the engine wants performed.
///
/// The engine never talks to providers directly; the run loop turns
/// these descriptors into scheduler submissions.
#[derive(Debug, Clone)]
pub enum FetchRequest {
    /// Fetch a route.
    Route {
        /// Preview or reroute.
        purpose: RequestPurpose,
        /// Trip sequence token at submission time.
        token: u64,
        /// Start of the leg.
        origin: Point,
        /// End of the leg.
        destination: Point,
    },
    /// Fetch an elevation profile aligned with the route geometry.
    Elevation {
        /// Trip sequence token at submission time.
        token: u64,
        /// Route polyline vertices, in order.
        points: Vec<Point>,
    },
    /// Fetch the speed limit near a position.
    SpeedLimit {
        /// Trip sequence token at submission time.
        token: u64,
        /// Position to query around.
        point: Point,
    },
}

/// Everything one engine call produced.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// Events for consumers, in emission order.
    pub events: Vec<NavEvent>,
    /// Fetches for the scheduler.
    pub requests: Vec<FetchRequest>,
}

impl EngineOutput {
    /// Output with no events and no requests.
    pub fn empty() -> Self {
        Self::default()
    }
}
