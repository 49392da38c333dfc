//! Command line frontend for the wayfinder navigation engine.
//!
//! `simulate` drives a virtual vehicle along a fetched route and
//! prints guidance as it happens; `geocode` resolves free text to
//! coordinates; `config` prints the effective configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use wayfinder::advisory::{Advisory, EcoHint};
use wayfinder::app::{NavApp, NavCommand, NavConfig, Providers};
use wayfinder::config::{config_file_path, ConfigFile};
use wayfinder::engine::{NavEvent, PositionFix};
use wayfinder::geo::{haversine_distance, Point};
use wayfinder::telemetry::NavMetrics;

#[derive(Parser)]
#[command(name = "wayfinder", version, about = "Turn-by-turn navigation engine")]
struct Cli {
    /// Log verbosity (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Write daily log files into this directory instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Alternative configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a route and drive a simulated vehicle along it.
    Simulate {
        /// Start latitude in degrees.
        #[arg(long)]
        from_lat: f64,
        /// Start longitude in degrees.
        #[arg(long)]
        from_lon: f64,
        /// Destination latitude in degrees.
        #[arg(long)]
        to_lat: f64,
        /// Destination longitude in degrees.
        #[arg(long)]
        to_lon: f64,
        /// Simulated speed in km/h.
        #[arg(long, default_value_t = 50.0)]
        speed: f64,
        /// Seconds between simulated position fixes.
        #[arg(long, default_value_t = 1.0)]
        interval: f64,
    },
    /// Resolve a free-text query to coordinates.
    Geocode {
        /// Place name or address.
        query: String,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _guard = match &cli.log_dir {
        Some(dir) => Some(wayfinder::logging::init_with_file(&cli.log_level, dir)),
        None => {
            wayfinder::logging::init(&cli.log_level);
            None
        }
    };

    if let Err(e) = run(cli).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let file = match &cli.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    let config = NavConfig::from_config_file(&file);

    match cli.command {
        Command::Simulate {
            from_lat,
            from_lon,
            to_lat,
            to_lon,
            speed,
            interval,
        } => {
            simulate(
                config,
                Point::new(from_lat, from_lon),
                Point::new(to_lat, to_lon),
                speed,
                interval,
            )
            .await
        }
        Command::Geocode { query } => geocode(config, &query).await,
        Command::Config => show_config(&file),
    }
}

async fn simulate(
    config: NavConfig,
    origin: Point,
    destination: Point,
    speed_kmh: f64,
    interval_s: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let providers = Providers::http(&config.endpoints)?;
    let metrics = Arc::new(NavMetrics::new());
    let (app, handle, mut events) = NavApp::new(config, providers, Arc::clone(&metrics));

    let shutdown = CancellationToken::new();
    let loop_task = tokio::spawn(app.run(shutdown.clone()));

    handle
        .command(NavCommand::SelectDestination {
            origin,
            destination,
            label: format!("{:.5},{:.5}", destination.lat, destination.lon),
        })
        .await?;

    // Wait for the route preview before moving.
    let route = loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                shutdown.cancel();
                let _ = loop_task.await;
                return Ok(());
            }
            event = events.recv() => match event {
                Some(NavEvent::PreviewReady { route }) => break route,
                Some(NavEvent::RouteFetchFailed { message }) => {
                    shutdown.cancel();
                    let _ = loop_task.await;
                    return Err(message.into());
                }
                Some(_) => {}
                None => return Err("event stream closed".into()),
            }
        }
    };
    println!(
        "Route: {} steps, {:.1} km, {:.0} min",
        route.steps.len(),
        route.distance_m / 1000.0,
        route.duration_s / 60.0
    );
    handle.command(NavCommand::ApprovePreview).await?;

    let mut geometry = route.geometry;
    let mut travelled = 0.0;
    let fix_step_m = speed_kmh / 3.6 * interval_s;
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(interval_s));

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
            _ = ticker.tick() => {
                travelled += fix_step_m;
                let position = point_along(&geometry, travelled);
                handle.fix(PositionFix::at(position).with_speed(speed_kmh)).await?;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    NavEvent::RerouteCompleted { route } => {
                        println!(
                            "New route: {} steps, {:.1} km",
                            route.steps.len(),
                            route.distance_m / 1000.0
                        );
                        geometry = route.geometry;
                        travelled = 0.0;
                    }
                    NavEvent::LegRouteReady { route } => {
                        println!(
                            "Next stop: {} steps, {:.1} km",
                            route.steps.len(),
                            route.distance_m / 1000.0
                        );
                        geometry = route.geometry;
                        travelled = 0.0;
                    }
                    NavEvent::TripCompleted { .. } => {
                        println!("Destination reached");
                        break;
                    }
                    other => announce(&other),
                }
            }
        }
    }

    shutdown.cancel();
    let _ = loop_task.await;

    let snapshot = metrics.snapshot();
    println!(
        "Fixes {} | steps {} | deviations {} | reroutes {}/{} | retries {}",
        snapshot.fixes_processed,
        snapshot.steps_advanced,
        snapshot.deviations_detected,
        snapshot.reroutes_completed,
        snapshot.reroutes_started,
        snapshot.requests_retried,
    );
    Ok(())
}

fn announce(event: &NavEvent) {
    match event {
        NavEvent::StepAdvanced { step_index } => {
            println!("Step {} complete", step_index + 1);
        }
        NavEvent::DeviationDetected { distance_m } => {
            println!("Off route by {distance_m:.0} m");
        }
        NavEvent::RerouteStarted => println!("Recalculating..."),
        NavEvent::AdvisoryFired { advisory } => match advisory {
            Advisory::SpeedWarning {
                speed_kmh,
                limit_kmh,
                limit_stale,
            } => {
                let marker = if *limit_stale { " (limit unverified)" } else { "" };
                println!("Slow down: {speed_kmh:.0} km/h in a {limit_kmh:.0} zone{marker}");
            }
            Advisory::Eco { hint, slope_percent } => match hint {
                EcoHint::SteepClimb => {
                    println!("Steep climb ahead ({slope_percent:.1}%), ease on the throttle")
                }
                EcoHint::SteepDescent => {
                    println!("Steep descent ({slope_percent:.1}%), lift off and coast")
                }
            },
            Advisory::StepReminder {
                instruction,
                distance_m,
            } => {
                println!("In {distance_m:.0} m: {instruction}");
            }
        },
        NavEvent::HeadingUpdated { .. } => {}
        NavEvent::RouteFetchFailed { message } => println!("Route fetch failed: {message}"),
        _ => {}
    }
}

/// Position `travelled_m` meters along the polyline, clamped to its end.
fn point_along(geometry: &[Point], travelled_m: f64) -> Point {
    let mut remaining = travelled_m;
    for pair in geometry.windows(2) {
        let length = haversine_distance(pair[0], pair[1]);
        if remaining <= length && length > 0.0 {
            let t = remaining / length;
            return Point::new(
                pair[0].lat + (pair[1].lat - pair[0].lat) * t,
                pair[0].lon + (pair[1].lon - pair[0].lon) * t,
            );
        }
        remaining -= length;
    }
    *geometry.last().expect("route geometry is never empty")
}

async fn geocode(config: NavConfig, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let providers = Providers::http(&config.endpoints)?;
    let candidates = providers.geocode.geocode(query).await?;
    if candidates.is_empty() {
        println!("No results for '{query}'");
        return Ok(());
    }
    for candidate in candidates {
        println!(
            "{:.6},{:.6}  {}",
            candidate.point.lat, candidate.point.lon, candidate.label
        );
    }
    Ok(())
}

fn show_config(file: &ConfigFile) -> Result<(), Box<dyn std::error::Error>> {
    println!("File: {}", config_file_path()?.display());
    println!("[navigation]");
    println!(
        "step_arrival_threshold_m = {}",
        file.navigation.step_arrival_threshold_m
    );
    println!(
        "deviation_threshold_m = {}",
        file.navigation.deviation_threshold_m
    );
    println!("reroute_cooldown_ms = {}", file.navigation.reroute_cooldown_ms);
    println!(
        "lookahead_distance_m = {}",
        file.navigation.lookahead_distance_m
    );
    println!(
        "sliding_window_segments = {}",
        file.navigation.sliding_window_segments
    );
    println!(
        "manual_override_timeout_ms = {}",
        file.navigation.manual_override_timeout_ms
    );
    println!(
        "speed_limit_refresh_m = {}",
        file.navigation.speed_limit_refresh_m
    );
    println!("[scheduler]");
    println!("max_requests = {}", file.scheduler.max_requests);
    println!("request_delay_ms = {}", file.scheduler.request_delay_ms);
    println!("retry_attempts = {}", file.scheduler.retry_attempts);
    println!("[advisory]");
    println!("eco_cooldown_s = {}", file.advisory.eco_cooldown_s);
    println!(
        "step_reminder_cooldown_s = {}",
        file.advisory.step_reminder_cooldown_s
    );
    println!("speed_warning_hold_s = {}", file.advisory.speed_warning_hold_s);
    println!("speed_tolerance_kmh = {}", file.advisory.speed_tolerance_kmh);
    println!(
        "slope_threshold_percent = {}",
        file.advisory.slope_threshold_percent
    );
    println!("reminder_distance_m = {}", file.advisory.reminder_distance_m);
    println!("[providers]");
    println!("osrm_url = {}", file.providers.osrm_url);
    println!("elevation_url = {}", file.providers.elevation_url);
    println!("overpass_url = {}", file.providers.overpass_url);
    println!("nominatim_url = {}", file.providers.nominatim_url);
    Ok(())
}
