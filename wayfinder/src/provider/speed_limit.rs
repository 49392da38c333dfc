//! Overpass-style speed limit adapter.
//!
//! Queries mapped `maxspeed` tags on ways near a position. Values
//! arrive as free-form tag strings ("50", "30 mph", "none"); parsing
//! normalizes them to km/h.

use super::http::HttpClient;
use super::types::ProviderError;
use super::SpeedLimitProvider;
use crate::geo::Point;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Default public Overpass endpoint.
pub const DEFAULT_OVERPASS_BASE: &str = "https://overpass-api.de";

/// Search radius around the fix, in meters.
const QUERY_RADIUS_M: u32 = 20;

/// Speed limit adapter for Overpass-compatible backends.
pub struct OverpassSpeedLimits<C: HttpClient> {
    base_url: String,
    http: Arc<C>,
}

impl<C: HttpClient> OverpassSpeedLimits<C> {
    /// Creates a provider against the given base URL.
    pub fn new(base_url: impl Into<String>, http: Arc<C>) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    fn query_url(&self, point: Point) -> String {
        // Ways with a maxspeed tag within the radius, JSON output.
        let query = format!(
            "[out:json];way(around:{},{:.6},{:.6})[maxspeed];out%20tags;",
            QUERY_RADIUS_M, point.lat, point.lon
        );
        format!("{}/api/interpreter?data={}", self.base_url, query)
    }
}

impl<C: HttpClient> SpeedLimitProvider for OverpassSpeedLimits<C> {
    fn fetch_speed_limit(
        &self,
        point: Point,
    ) -> BoxFuture<'_, Result<Option<f64>, ProviderError>> {
        let url = self.query_url(point);
        Box::pin(async move {
            debug!(lat = point.lat, lon = point.lon, "Fetching speed limit");
            let body = self.http.get(&url).await?;

            let response: OverpassResponse = serde_json::from_slice(&body)
                .map_err(|e| ProviderError::Malformed(format!("overpass JSON: {}", e)))?;

            // First way with a parseable maxspeed wins.
            Ok(response
                .elements
                .iter()
                .filter_map(|e| e.tags.maxspeed.as_deref())
                .find_map(parse_maxspeed))
        })
    }
}

/// Parses an OSM `maxspeed` tag value into km/h.
///
/// Accepts plain km/h numbers ("50"), mph values ("30 mph") and
/// returns `None` for unlimited or non-numeric values ("none",
/// "signals", "walk").
pub fn parse_maxspeed(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some(mph) = value.strip_suffix("mph") {
        return mph.trim().parse::<f64>().ok().map(|v| v * 1.609_344);
    }
    if let Some(kmh) = value.strip_suffix("km/h") {
        return kmh.trim().parse::<f64>().ok();
    }
    value.parse::<f64>().ok()
}

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    #[serde(default)]
    tags: OverpassTags,
}

#[derive(Deserialize, Default)]
struct OverpassTags {
    maxspeed: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::super::http::tests::MockHttpClient;
    use super::*;

    #[test]
    fn parse_plain_kmh() {
        assert_eq!(parse_maxspeed("50"), Some(50.0));
        assert_eq!(parse_maxspeed(" 100 "), Some(100.0));
        assert_eq!(parse_maxspeed("30 km/h"), Some(30.0));
    }

    #[test]
    fn parse_mph_converts() {
        let v = parse_maxspeed("30 mph").unwrap();
        assert!((v - 48.28).abs() < 0.01, "got {v}");
    }

    #[test]
    fn parse_non_numeric_is_none() {
        assert_eq!(parse_maxspeed("none"), None);
        assert_eq!(parse_maxspeed("signals"), None);
        assert_eq!(parse_maxspeed(""), None);
    }

    #[tokio::test]
    async fn first_tagged_way_wins() {
        let body = r#"{"elements": [
            {"tags": {}},
            {"tags": {"maxspeed": "none"}},
            {"tags": {"maxspeed": "70"}},
            {"tags": {"maxspeed": "50"}}
        ]}"#;
        let provider =
            OverpassSpeedLimits::new("http://op.test", Arc::new(MockHttpClient::json(body)));

        let limit = provider
            .fetch_speed_limit(Point::new(48.0, 16.0))
            .await
            .unwrap();
        assert_eq!(limit, Some(70.0));
    }

    #[tokio::test]
    async fn unmapped_road_is_none() {
        let body = r#"{"elements": []}"#;
        let provider =
            OverpassSpeedLimits::new("http://op.test", Arc::new(MockHttpClient::json(body)));

        let limit = provider
            .fetch_speed_limit(Point::new(48.0, 16.0))
            .await
            .unwrap();
        assert_eq!(limit, None);
    }
}
