//! HTTP client abstraction for testability.

use super::types::ProviderError;
use futures::future::BoxFuture;
use std::time::Duration;

/// Trait for HTTP GET operations.
///
/// This abstraction allows for dependency injection and easier
/// testing by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync + 'static {
    /// Performs an HTTP GET request and returns the response body.
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Vec<u8>, ProviderError>>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with a 30 second timeout.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(30)
    }

    /// Creates a client with a custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("wayfinder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Vec<u8>, ProviderError>> {
        let request = self.client.get(url);
        let url = url.to_owned();
        Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|e| ProviderError::Http(format!("Request failed: {}", e)))?;

            let status = response.status();
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }
            if status.is_server_error() {
                return Err(ProviderError::ServerBusy(format!("HTTP {}", status)));
            }
            if !status.is_success() {
                return Err(ProviderError::Http(format!("HTTP {} from {}", status, url)));
            }

            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| ProviderError::Http(format!("Failed to read response: {}", e)))
        })
    }
}
