//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Pick the log level from CLI, environment or config
//!
//! # Design Decisions
//! - `RUST_LOG`, when set, wins over everything else
//! - Dependency noise (hyper, tower_http) capped at `warn` unless asked for
//! - JSON for machine consumption, pretty by default for a dev server

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber.
///
/// `level_override` comes from the command line and beats the config file.
/// Fails if a global subscriber is already set.
pub fn init_logging(
    config: &ObservabilityConfig,
    level_override: Option<&str>,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let level = normalize_level(level_override.unwrap_or(&config.log_level));
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init(),
    }
}

/// Map a level name onto a filter level, defaulting to `info`.
pub fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        "off" => "off",
        _ => "info",
    }
}

fn filter_directives(level: &str) -> String {
    format!("{level},hyper=warn,hyper_util=warn,tower_http=warn")
}
