//! HTTP reachability probe for the monitored site.

use std::fmt;
use std::time::Duration;

use crate::config::MonitorConfig;

/// Upper bound on how long the probe waits for a response.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of one probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reachability {
    /// No URL configured; nothing was requested.
    NotConfigured,
    /// The site answered with a 2xx status.
    Reachable {
        /// HTTP status code.
        status: u16,
    },
    /// The site answered with a non-success status.
    Unreachable {
        /// HTTP status code.
        status: u16,
    },
    /// No response arrived before the timeout.
    TimedOut,
    /// The request failed before a response arrived.
    Failed {
        /// Transport error description.
        cause: String,
    },
}

impl Reachability {
    /// True only for [`Reachability::Reachable`].
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => f.write_str("no URL configured"),
            Self::Reachable { status } => write!(f, "reachable with status code {status}"),
            Self::Unreachable { status } => write!(f, "not reachable with status code {status}"),
            Self::TimedOut => f.write_str("request timed out"),
            Self::Failed { cause } => write!(f, "request failed: {cause}"),
        }
    }
}

/// Issues bounded-timeout GET requests against a configured URL.
#[derive(Clone, Debug)]
pub struct SiteProbe {
    client: reqwest::Client,
    url: Option<String>,
    timeout: Duration,
}

impl SiteProbe {
    /// Creates a probe. Blank URLs are treated as absent.
    #[must_use]
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Creates a probe for `ESMOS_URL`.
    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.site_url().map(str::to_owned))
    }

    /// Overrides the timeout.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Target URL, if configured.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Returns whether the site answered with a success status in time.
    pub async fn check_site_status(&self) -> bool {
        self.probe().await.is_reachable()
    }

    /// Probes the site and classifies the outcome. Never fails: timeouts and
    /// transport errors are ordinary negative results.
    pub async fn probe(&self) -> Reachability {
        let Some(url) = self.url.as_deref() else {
            tracing::error!("ESMOS_URL is not defined in environment variables");
            return Reachability::NotConfigured;
        };

        tracing::info!("Checking site status for {url}...");
        // The timer lives inside this future and is dropped with it on every
        // path.
        let outcome = match tokio::time::timeout(self.timeout, self.client.get(url).send()).await
        {
            Ok(Ok(response)) if response.status().is_success() => Reachability::Reachable {
                status: response.status().as_u16(),
            },
            Ok(Ok(response)) => Reachability::Unreachable {
                status: response.status().as_u16(),
            },
            Ok(Err(err)) => Reachability::Failed {
                cause: err.to_string(),
            },
            Err(_) => Reachability::TimedOut,
        };

        match &outcome {
            Reachability::Reachable { status } => {
                tracing::info!(status, "Site is reachable with status code {status}");
            }
            Reachability::Unreachable { status } => {
                tracing::info!(status, "Site is not reachable with status code {status}");
            }
            Reachability::TimedOut | Reachability::Failed { .. } => {
                tracing::error!(url, cause = %outcome, "Failed to fetch site or request timed out");
            }
            Reachability::NotConfigured => {}
        }
        outcome
    }
}
