//! Application error types.

use std::fmt;

use crate::config::ConfigError;
use crate::provider::ProviderError;

/// Errors that can occur during application lifecycle.
#[derive(Debug)]
pub enum AppError {
    /// Configuration file could not be loaded.
    Config(ConfigError),

    /// The HTTP client could not be constructed.
    HttpClient(ProviderError),

    /// The navigation loop or scheduler is no longer running.
    Stopped,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => {
                write!(f, "Configuration error: {}", e)
            }
            AppError::HttpClient(e) => {
                write!(f, "Failed to create HTTP client: {}", e)
            }
            AppError::Stopped => {
                write!(f, "Navigation loop is not running")
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::HttpClient(e) => Some(e),
            AppError::Stopped => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        AppError::HttpClient(e)
    }
}
