//! Wayfinder - live turn-by-turn navigation engine.
//!
//! Given a planned route (polyline geometry plus ordered maneuver
//! steps) and a continuous stream of GPS fixes, Wayfinder maintains
//! navigation state: it detects step completion and route deviation,
//! triggers rerouting, chains multi-stop journeys, and derives
//! advisory signals (speed, eco, turn cues) under cooldown policies.
//!
//! # Architecture
//!
//! ```text
//! position fix ──► geo (match/bearing) ──► engine (state machine)
//!                                             │          │
//!                                        NavEvents   FetchRequests
//!                                             │          │
//!                                             ▼          ▼
//!                                        consumers   scheduler ──► provider (HTTP)
//!                                                        │
//!                                             completions rejoin the
//!                                             engine stream, token-checked
//! ```
//!
//! The engine never blocks and never performs I/O; all backend traffic
//! flows through the bounded, retrying, cancellable request scheduler
//! and rejoins the single event stream as completion events.

pub mod advisory;
pub mod app;
pub mod config;
pub mod engine;
pub mod geo;
pub mod logging;
pub mod provider;
pub mod route;
pub mod scheduler;
pub mod telemetry;
pub mod trip;
