//! Shared tracing/logging initialization.
//!
//! The tutor server and the student client set up `tracing_subscriber` the
//! same way: an env-filter plus either human-readable or JSON output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default filter directive for a binary, e.g. `rollcall_server=info`.
///
/// The `rollcall::audit` target is always included at the same level.
pub fn default_filter(crate_name: &str, level: &str) -> String {
    format!(
        "{}={level},rollcall_core={level},rollcall::audit={level}",
        crate_name.replace('-', "_")
    )
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- used when `RUST_LOG` is not set.
/// * `log_json` -- emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
