//! # rook-telemetry
//!
//! Process-wide observability setup: a `tracing` subscriber with an
//! [`EnvFilter`] and a Prometheus recorder behind the `metrics` facade.
//!
//! Call [`init_telemetry`] once at startup, then [`install_metrics_recorder`]
//! and hand its handle to the server's `/metrics` route.

#![deny(unsafe_code)]

pub mod recorder;

pub use recorder::{describe_metrics, install_metrics_recorder, render};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Level or per-module directive could not be parsed.
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides (e.g. `"rook_server::hub" => "debug"`).
    pub modules: Vec<(String, String)>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: Vec::new(),
        }
    }
}

/// Filter directive string for a config, e.g. `info,rook_server=debug`.
pub fn filter_directives(config: &TelemetryConfig) -> String {
    let mut directives = config.level.to_lowercase();
    for (module, level) in &config.modules {
        directives.push(',');
        directives.push_str(module);
        directives.push('=');
        directives.push_str(&level.to_lowercase());
    }
    directives
}

/// Install the global tracing subscriber. Call once at startup.
///
/// `RUST_LOG` takes precedence over the configured directives.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(config))?,
    };

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;
    Ok(())
}
