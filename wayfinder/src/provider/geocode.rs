//! Nominatim-style forward geocoding adapter.

use super::http::HttpClient;
use super::types::ProviderError;
use super::GeocodeProvider;
use crate::geo::Point;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Default public Nominatim endpoint.
pub const DEFAULT_NOMINATIM_BASE: &str = "https://nominatim.openstreetmap.org";

/// One geocoding candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Display label for the result.
    pub label: String,
    /// Resolved position.
    pub point: Point,
}

/// Geocoding adapter for Nominatim-compatible backends.
pub struct NominatimGeocoder<C: HttpClient> {
    base_url: String,
    http: Arc<C>,
}

impl<C: HttpClient> NominatimGeocoder<C> {
    /// Creates a geocoder against the given base URL.
    pub fn new(base_url: impl Into<String>, http: Arc<C>) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    fn search_url(&self, query: &str) -> String {
        // Minimal percent-encoding: the query is free text.
        let encoded: String = query
            .chars()
            .map(|c| match c {
                ' ' => "+".to_string(),
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | ',' => c.to_string(),
                other => {
                    let mut buf = [0u8; 4];
                    other
                        .encode_utf8(&mut buf)
                        .bytes()
                        .map(|b| format!("%{:02X}", b))
                        .collect()
                }
            })
            .collect();
        format!("{}/search?q={}&format=json&limit=5", self.base_url, encoded)
    }
}

impl<C: HttpClient> GeocodeProvider for NominatimGeocoder<C> {
    fn geocode(&self, query: &str) -> BoxFuture<'_, Result<Vec<Candidate>, ProviderError>> {
        let url = self.search_url(query);
        Box::pin(async move {
            debug!(url = %url, "Geocoding");
            let body = self.http.get(&url).await?;

            let raw: Vec<NominatimResult> = serde_json::from_slice(&body)
                .map_err(|e| ProviderError::Malformed(format!("geocode JSON: {}", e)))?;

            raw.into_iter()
                .map(|r| {
                    // Nominatim ships coordinates as strings.
                    let lat = r.lat.parse::<f64>();
                    let lon = r.lon.parse::<f64>();
                    match (lat, lon) {
                        (Ok(lat), Ok(lon)) => Ok(Candidate {
                            label: r.display_name,
                            point: Point::new(lat, lon),
                        }),
                        _ => Err(ProviderError::Malformed(
                            "non-numeric coordinates".to_string(),
                        )),
                    }
                })
                .collect()
        })
    }
}

#[derive(Deserialize)]
struct NominatimResult {
    display_name: String,
    lat: String,
    lon: String,
}

#[cfg(test)]
mod tests {
    use super::super::http::tests::MockHttpClient;
    use super::*;

    #[tokio::test]
    async fn parses_string_coordinates() {
        let body = r#"[
            {"display_name": "Stephansplatz, Wien", "lat": "48.2083537", "lon": "16.3725042"},
            {"display_name": "Stephansplatz, Hamburg", "lat": "53.5545255", "lon": "9.9880299"}
        ]"#;
        let geocoder =
            NominatimGeocoder::new("http://nom.test", Arc::new(MockHttpClient::json(body)));

        let candidates = geocoder.geocode("stephansplatz").await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].label, "Stephansplatz, Wien");
        assert!((candidates[0].point.lat - 48.2083537).abs() < 1e-9);
    }

    #[tokio::test]
    async fn bad_coordinates_are_malformed() {
        let body = r#"[{"display_name": "x", "lat": "not-a-number", "lon": "16.0"}]"#;
        let geocoder =
            NominatimGeocoder::new("http://nom.test", Arc::new(MockHttpClient::json(body)));

        let err = geocoder.geocode("x").await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn query_is_encoded() {
        let geocoder =
            NominatimGeocoder::new("http://nom.test", Arc::new(MockHttpClient::json("[]")));
        let url = geocoder.search_url("Wien Straße 1");
        assert_eq!(
            url,
            "http://nom.test/search?q=Wien+Stra%C3%9Fe+1&format=json&limit=5"
        );
    }
}
