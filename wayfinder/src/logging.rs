//! Logging initialisation.
//!
//! The library only emits `tracing` events; installing a subscriber is
//! the binary's job, via one of the helpers here. The `RUST_LOG`
//! environment variable overrides the default level.

use std::path::Path;

use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::EnvFilter;

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn timer() -> LocalTime<&'static [time::format_description::BorrowedFormatItem<'static>]> {
    LocalTime::new(format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ))
}

/// Installs a console subscriber.
pub fn init(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_timer(timer())
        .init();
}

/// Installs a subscriber writing daily-rotated files under
/// `directory`.
///
/// The returned guard flushes buffered log lines on drop; hold it for
/// the lifetime of the process.
pub fn init_with_file(default_level: &str, directory: &Path) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(directory, "wayfinder.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_timer(timer())
        .with_writer(writer)
        .with_ansi(false)
        .init();

    guard
}
