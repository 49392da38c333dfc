//! Open-Elevation-style elevation profile adapter.

use super::http::HttpClient;
use super::types::ProviderError;
use super::ElevationProvider;
use crate::geo::Point;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

/// Default public open-elevation endpoint.
pub const DEFAULT_ELEVATION_BASE: &str = "https://api.open-elevation.com";

/// Elevation adapter for open-elevation compatible backends.
pub struct OpenElevationProvider<C: HttpClient> {
    base_url: String,
    http: Arc<C>,
}

impl<C: HttpClient> OpenElevationProvider<C> {
    /// Creates a provider against the given base URL.
    pub fn new(base_url: impl Into<String>, http: Arc<C>) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    fn lookup_url(&self, points: &[Point]) -> String {
        let mut locations = String::new();
        for (i, p) in points.iter().enumerate() {
            if i > 0 {
                locations.push('|');
            }
            let _ = write!(locations, "{:.6},{:.6}", p.lat, p.lon);
        }
        format!("{}/api/v1/lookup?locations={}", self.base_url, locations)
    }
}

impl<C: HttpClient> ElevationProvider for OpenElevationProvider<C> {
    fn fetch_profile(&self, points: Vec<Point>) -> BoxFuture<'_, Result<Vec<f64>, ProviderError>> {
        let url = self.lookup_url(&points);
        Box::pin(async move {
            if points.is_empty() {
                return Ok(Vec::new());
            }
            debug!(count = points.len(), "Fetching elevation profile");
            let body = self.http.get(&url).await?;

            let response: LookupResponse = serde_json::from_slice(&body)
                .map_err(|e| ProviderError::Malformed(format!("elevation JSON: {}", e)))?;

            if response.results.len() != points.len() {
                return Err(ProviderError::Malformed(format!(
                    "expected {} elevations, got {}",
                    points.len(),
                    response.results.len()
                )));
            }

            Ok(response.results.into_iter().map(|r| r.elevation).collect())
        })
    }
}

#[derive(Deserialize)]
struct LookupResponse {
    results: Vec<LookupResult>,
}

#[derive(Deserialize)]
struct LookupResult {
    elevation: f64,
}
