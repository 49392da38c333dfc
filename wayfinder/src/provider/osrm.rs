//! OSRM-style routing adapter.
//!
//! Consumes the minimal shape an OSRM `route` answer shares with
//! compatible backends: a GeoJSON line geometry plus per-leg maneuver
//! steps. Everything beyond that shape is ignored.

use super::http::HttpClient;
use super::types::ProviderError;
use super::RoutingProvider;
use crate::geo::Point;
use crate::route::{Route, Step};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Default public OSRM endpoint.
pub const DEFAULT_OSRM_BASE: &str = "https://router.project-osrm.org";

/// Routing adapter for OSRM-compatible backends.
pub struct OsrmRouter<C: HttpClient> {
    base_url: String,
    http: Arc<C>,
}

impl<C: HttpClient> OsrmRouter<C> {
    /// Creates a router against the given base URL.
    pub fn new(base_url: impl Into<String>, http: Arc<C>) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    fn route_url(&self, origin: Point, destination: Point) -> String {
        format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}?steps=true&geometries=geojson&overview=full",
            self.base_url, origin.lon, origin.lat, destination.lon, destination.lat
        )
    }
}

impl<C: HttpClient> RoutingProvider for OsrmRouter<C> {
    fn fetch_route(
        &self,
        origin: Point,
        destination: Point,
    ) -> BoxFuture<'_, Result<Route, ProviderError>> {
        let url = self.route_url(origin, destination);
        Box::pin(async move {
            debug!(url = %url, "Fetching route");
            let body = self.http.get(&url).await?;
            parse_route(&body)
        })
    }
}

/// Parses an OSRM route answer into the engine's [`Route`] model.
fn parse_route(body: &[u8]) -> Result<Route, ProviderError> {
    let response: OsrmResponse = serde_json::from_slice(body)
        .map_err(|e| ProviderError::Malformed(format!("route JSON: {}", e)))?;

    if response.code != "Ok" {
        return Err(ProviderError::Malformed(format!(
            "backend code {}",
            response.code
        )));
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("no routes in answer".to_string()))?;

    let geometry: Vec<Point> = route
        .geometry
        .coordinates
        .iter()
        .map(|c| Point::new(c[1], c[0]))
        .collect();

    if geometry.len() < 2 {
        return Err(ProviderError::Malformed("geometry too short".to_string()));
    }

    let mut steps = Vec::new();
    for leg in route.legs {
        for raw in leg.steps {
            // OSRM emits a trailing zero-length "arrive" step per leg;
            // keep it, it carries the destination coordinate.
            let index = steps.len();
            steps.push(Step {
                index,
                end: Point::new(raw.maneuver.location[1], raw.maneuver.location[0]),
                instruction: instruction_text(&raw),
                distance_m: raw.distance,
                duration_s: raw.duration,
                completed: false,
            });
        }
    }

    if steps.is_empty() {
        return Err(ProviderError::Malformed("no steps in answer".to_string()));
    }

    Ok(Route::new(geometry, steps))
}

fn instruction_text(step: &OsrmStep) -> String {
    let action = match (step.maneuver.kind.as_str(), step.maneuver.modifier.as_deref()) {
        ("depart", _) => "Head out".to_string(),
        ("arrive", _) => "Arrive at destination".to_string(),
        ("turn", Some(modifier)) => format!("Turn {}", modifier),
        ("continue", _) => "Continue".to_string(),
        ("roundabout", _) => "Take the roundabout".to_string(),
        (kind, Some(modifier)) => format!("{} {}", capitalize(kind), modifier),
        (kind, None) => capitalize(kind),
    };

    if step.name.is_empty() {
        action
    } else {
        format!("{} onto {}", action, step.name)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    geometry: GeoJsonLine,
    legs: Vec<OsrmLeg>,
}

#[derive(Deserialize)]
struct GeoJsonLine {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Deserialize)]
struct OsrmLeg {
    steps: Vec<OsrmStep>,
}

#[derive(Deserialize)]
struct OsrmStep {
    distance: f64,
    duration: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
}

#[derive(Deserialize)]
struct OsrmManeuver {
    location: [f64; 2],
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::super::http::tests::MockHttpClient;
    use super::*;

    const ROUTE_JSON: &str = r#"{
        "code": "Ok",
        "routes": [{
            "distance": 1500.0,
            "duration": 180.0,
            "geometry": {"coordinates": [[16.0, 48.0], [16.007, 48.0], [16.02, 48.0]]},
            "legs": [{
                "steps": [
                    {"distance": 500.0, "duration": 60.0, "name": "Hauptstrasse",
                     "maneuver": {"location": [16.007, 48.0], "type": "depart"}},
                    {"distance": 1000.0, "duration": 120.0, "name": "Ringweg",
                     "maneuver": {"location": [16.013, 48.0], "type": "turn", "modifier": "left"}},
                    {"distance": 0.0, "duration": 0.0, "name": "",
                     "maneuver": {"location": [16.02, 48.0], "type": "arrive"}}
                ]
            }]
        }]
    }"#;

    #[tokio::test]
    async fn parses_minimal_route_shape() {
        let router = OsrmRouter::new("http://osrm.test", Arc::new(MockHttpClient::json(ROUTE_JSON)));
        let route = router
            .fetch_route(Point::new(48.0, 16.0), Point::new(48.0, 16.02))
            .await
            .unwrap();

        assert_eq!(route.geometry.len(), 3);
        assert_eq!(route.steps.len(), 3);
        assert_eq!(route.steps[0].index, 0);
        assert_eq!(route.steps[1].instruction, "Turn left onto Ringweg");
        assert_eq!(route.steps[2].instruction, "Arrive at destination");
        // Geometry arrives lon-first, model is lat-first
        assert!((route.steps[1].end.lat - 48.0).abs() < 1e-9);
        assert!((route.steps[1].end.lon - 16.013).abs() < 1e-9);
        assert!((route.distance_m - 1500.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn backend_error_code_is_malformed() {
        let body = r#"{"code": "NoRoute", "routes": []}"#;
        let router = OsrmRouter::new("http://osrm.test", Arc::new(MockHttpClient::json(body)));
        let err = router
            .fetch_route(Point::new(48.0, 16.0), Point::new(48.0, 16.02))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn transport_errors_pass_through() {
        let router = OsrmRouter::new(
            "http://osrm.test",
            Arc::new(MockHttpClient::failing(ProviderError::RateLimited)),
        );
        let err = router
            .fetch_route(Point::new(48.0, 16.0), Point::new(48.0, 16.02))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::RateLimited);
    }

    #[test]
    fn url_is_lon_lat_ordered() {
        let router = OsrmRouter::new("http://osrm.test", Arc::new(MockHttpClient::json("{}")));
        let url = router.route_url(Point::new(48.0, 16.0), Point::new(48.1, 16.2));
        assert!(url.starts_with("http://osrm.test/route/v1/driving/16.000000,48.000000;"));
        assert!(url.contains("geometries=geojson"));
    }
}
