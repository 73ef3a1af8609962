//! Error reporting through the Sentry client.
//!
//! Better Stack accepts Sentry-compatible events, so the reporter is a plain
//! `sentry` client with its own hub. Capture queues the event on the client's
//! transport thread and never blocks or fails the caller.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use sentry::types::Dsn;
use sentry::{ClientOptions, Hub, Scope};
use thiserror::Error;

/// Release tag attached to every event.
pub const RELEASE: &str = "esmos-monitor@1.0.0";

/// Every trace is sampled.
pub const TRACES_SAMPLE_RATE: f32 = 1.0;

/// Receives errors that ended an invocation.
pub trait ErrorReporter: Send + Sync {
    /// Records `error`. Delivery is best-effort and must not fail the caller.
    fn capture_error(&self, error: &(dyn StdError + 'static));
}

impl<T: ErrorReporter + ?Sized> ErrorReporter for &T {
    fn capture_error(&self, error: &(dyn StdError + 'static)) {
        (**self).capture_error(error);
    }
}

impl<T: ErrorReporter + ?Sized> ErrorReporter for Arc<T> {
    fn capture_error(&self, error: &(dyn StdError + 'static)) {
        (**self).capture_error(error);
    }
}

/// Errors raised while configuring the reporter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReporterError {
    /// Raised when the DSN cannot be parsed.
    #[error("invalid error DSN: {0}")]
    InvalidDsn(String),
}

/// Options fixed at initialisation.
#[derive(Clone, Debug, PartialEq)]
pub struct ReporterOptions {
    /// Release tag attached to events.
    pub release: String,
    /// Fraction of traces sampled.
    pub traces_sample_rate: f32,
    /// Deployment environment attached to events.
    pub environment: Option<String>,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            release: String::from(RELEASE),
            traces_sample_rate: TRACES_SAMPLE_RATE,
            environment: None,
        }
    }
}

/// Reporter sending events to a Sentry-compatible ingestion endpoint.
pub struct SentryReporter {
    client: Arc<sentry::Client>,
    hub: Hub,
    options: ReporterOptions,
}

impl fmt::Debug for SentryReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentryReporter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SentryReporter {
    /// Creates a reporter for `dsn`
    /// (`scheme://public_key@host[:port][/path]/project_id`).
    ///
    /// # Errors
    ///
    /// Returns [`ReporterError::InvalidDsn`] when the DSN is malformed or
    /// lacks a public key or project id.
    pub fn new(dsn: &str, options: ReporterOptions) -> Result<Self, ReporterError> {
        let parsed = dsn
            .trim()
            .parse::<Dsn>()
            .map_err(|err| ReporterError::InvalidDsn(err.to_string()))?;
        let client_options = sentry::apply_defaults(ClientOptions {
            dsn: Some(parsed),
            release: Some(Cow::Owned(options.release.clone())),
            environment: options.environment.clone().map(Cow::Owned),
            traces_sample_rate: options.traces_sample_rate,
            ..ClientOptions::default()
        });
        let client = Arc::new(sentry::Client::with_options(client_options));
        let hub = Hub::new(Some(Arc::clone(&client)), Arc::new(Scope::default()));
        Ok(Self {
            client,
            hub,
            options,
        })
    }

    /// Blocks until queued events are sent or `timeout` elapses. Returns
    /// `false` when events were still pending at the deadline.
    #[must_use]
    pub fn flush(&self, timeout: Duration) -> bool {
        self.client.flush(Some(timeout))
    }

    /// Options the reporter was configured with.
    #[must_use]
    pub const fn options(&self) -> &ReporterOptions {
        &self.options
    }

    /// Options the underlying client runs with.
    #[must_use]
    pub fn client_options(&self) -> &ClientOptions {
        self.client.options()
    }
}

impl ErrorReporter for SentryReporter {
    fn capture_error(&self, error: &(dyn StdError + 'static)) {
        let event_id = self.hub.capture_error(error);
        tracing::debug!(event_id = %event_id, "Error report queued");
    }
}

/// Initialise-once holder for a reporter.
#[derive(Debug, Default)]
pub struct ReporterCell {
    inner: OnceLock<SentryReporter>,
}

impl ReporterCell {
    /// Creates an empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Returns the existing reporter, or configures one from `dsn` and
    /// `options`. Later calls ignore their arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ReporterError::InvalidDsn`] when the cell is empty and the
    /// DSN is malformed.
    pub fn initialize(
        &self,
        dsn: &str,
        options: ReporterOptions,
    ) -> Result<&SentryReporter, ReporterError> {
        if let Some(existing) = self.inner.get() {
            return Ok(existing);
        }
        let reporter = SentryReporter::new(dsn, options)?;
        Ok(self.inner.get_or_init(|| reporter))
    }

    /// Returns the reporter if the cell has been initialised.
    #[must_use]
    pub fn get(&self) -> Option<&SentryReporter> {
        self.inner.get()
    }
}

static GLOBAL_REPORTER: ReporterCell = ReporterCell::new();

/// Initialises the process-wide reporter; idempotent.
///
/// # Errors
///
/// Returns [`ReporterError::InvalidDsn`] when the first initialisation is
/// given a malformed DSN.
pub fn init_global(
    dsn: &str,
    options: ReporterOptions,
) -> Result<&'static SentryReporter, ReporterError> {
    GLOBAL_REPORTER.initialize(dsn, options)
}

/// Reporter that only writes the error to the log. Used when no DSN is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOnlyReporter;

impl ErrorReporter for LogOnlyReporter {
    fn capture_error(&self, error: &(dyn StdError + 'static)) {
        tracing::debug!(error = %error, "error reporting disabled; not forwarding");
    }
}
