//! Application bootstrap and lifecycle management.
//!
//! Wires the navigation engine, the request scheduler and the HTTP
//! provider adapters into a single runnable [`NavApp`]:
//!
//! ```ignore
//! use wayfinder::app::{NavApp, NavConfig, Providers};
//!
//! let config = NavConfig::from_config_file(&file);
//! let providers = Providers::http(&config.endpoints)?;
//! let (app, handle, events) = NavApp::new(config, providers, metrics);
//! tokio::spawn(app.run(shutdown.clone()));
//!
//! handle.command(NavCommand::SelectDestination { .. }).await?;
//! ```

mod bootstrap;
mod config;
mod error;

pub use bootstrap::{NavApp, NavCommand, NavHandle, Providers};
pub use config::{NavConfig, ProviderEndpoints};
pub use error::AppError;
