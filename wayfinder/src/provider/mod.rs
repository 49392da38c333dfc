//! External data adapters.
//!
//! Thin, trait-shaped access to the backends the engine consumes:
//! routing, elevation profiles, speed limits and forward geocoding.
//! Only the minimal data shape each backend must produce is modelled;
//! the engine never sees wire formats.

mod elevation;
mod geocode;
mod http;
mod osrm;
mod speed_limit;
mod types;

pub use elevation::{OpenElevationProvider, DEFAULT_ELEVATION_BASE};
pub use geocode::{Candidate, NominatimGeocoder, DEFAULT_NOMINATIM_BASE};
pub use http::{HttpClient, ReqwestClient};
pub use osrm::{OsrmRouter, DEFAULT_OSRM_BASE};
pub use speed_limit::{parse_maxspeed, OverpassSpeedLimits, DEFAULT_OVERPASS_BASE};
pub use types::ProviderError;

use crate::geo::Point;
use crate::route::Route;
use futures::future::BoxFuture;

/// Fetches a drivable route between two points.
pub trait RoutingProvider: Send + Sync + 'static {
    /// Fetches a route from `origin` to `destination`.
    fn fetch_route(
        &self,
        origin: Point,
        destination: Point,
    ) -> BoxFuture<'_, Result<Route, ProviderError>>;
}

/// Fetches elevations for a series of points.
///
/// Failures degrade: the advisory engine treats a missing profile as
/// flat terrain and disables slope-based tips.
pub trait ElevationProvider: Send + Sync + 'static {
    /// Fetches the elevation in meters for each point, in order.
    fn fetch_profile(&self, points: Vec<Point>) -> BoxFuture<'_, Result<Vec<f64>, ProviderError>>;
}

/// Fetches the posted speed limit near a point.
///
/// Failures degrade: the engine retains the last known value and
/// flags it stale.
pub trait SpeedLimitProvider: Send + Sync + 'static {
    /// Fetches the speed limit in km/h, or `None` where no limit is
    /// mapped.
    fn fetch_speed_limit(&self, point: Point)
        -> BoxFuture<'_, Result<Option<f64>, ProviderError>>;
}

/// Forward geocoding: free text to candidate locations.
pub trait GeocodeProvider: Send + Sync + 'static {
    /// Resolves `query` to an ordered candidate list.
    fn geocode(&self, query: &str) -> BoxFuture<'_, Result<Vec<Candidate>, ProviderError>>;
}
