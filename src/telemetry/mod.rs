//! Logging and error-reporting adapters.
//!
//! Logging is a single global `tracing` subscriber that renders to the
//! console and, when Better Stack credentials are configured, ships every
//! `info`-and-above event to the remote sink. Error reporting lives in
//! [`reporting`].

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::{Layer as _, SubscriberExt as _};
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

pub mod log_sink;
pub mod reporting;

pub use log_sink::{LogRecord, LogSinkHandle, LogSinkLayer, spawn_log_sink};
pub use reporting::{
    ErrorReporter, LogOnlyReporter, RELEASE, ReporterCell, ReporterError, ReporterOptions,
    SentryReporter, init_global,
};

use crate::config::{BetterStackConfig, MonitorConfig};

/// HTTP client crates whose events never reach the remote sink.
const TRANSPORT_TARGETS: [&str; 4] = ["hyper", "reqwest", "rustls", "h2"];

/// Errors raised while installing the logging pipeline.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum TelemetryError {
    /// Raised when the remote sink is requested outside a tokio runtime.
    #[error("remote log sink requires a running tokio runtime")]
    NoRuntime,
    /// Raised when a global subscriber is already installed.
    #[error("failed to install log subscriber: {0}")]
    AlreadyInstalled(String),
}

/// Inputs for [`init_logging`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoggingOptions {
    /// Render ANSI colours on the console.
    pub colorize: bool,
    /// `(endpoint, source token)` for Better Stack, when configured.
    pub sink: Option<(String, String)>,
}

impl LoggingOptions {
    /// Derives options from loaded configuration.
    #[must_use]
    pub fn from_config(monitor: &MonitorConfig, better_stack: &BetterStackConfig) -> Self {
        Self {
            colorize: monitor.is_development(),
            sink: better_stack.log_sink(),
        }
    }
}

/// Installs the global subscriber. Returns the sink handle when remote
/// shipping is enabled so callers can flush before exiting.
///
/// # Errors
///
/// Returns [`TelemetryError::NoRuntime`] when a sink is configured but no
/// runtime is running, and [`TelemetryError::AlreadyInstalled`] when a
/// global subscriber already exists.
pub fn init_logging(options: LoggingOptions) -> Result<Option<LogSinkHandle>, TelemetryError> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer()
        .with_ansi(options.colorize)
        .with_target(false)
        .with_filter(console_filter);

    let (remote, handle) = match options.sink {
        Some((endpoint, token)) => {
            let runtime =
                tokio::runtime::Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;
            let (layer, handle) = spawn_log_sink(endpoint, token, &runtime);
            (Some(layer.with_filter(remote_filter())), Some(handle))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(remote)
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInstalled(err.to_string()))?;
    Ok(handle)
}

/// `info` and above, minus the HTTP stack the sink itself uses.
fn remote_filter() -> Targets {
    TRANSPORT_TARGETS
        .into_iter()
        .fold(Targets::new().with_default(LevelFilter::INFO), |targets, target| {
            targets.with_target(target, LevelFilter::OFF)
        })
}
