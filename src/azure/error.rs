//! Error types for the Azure backend.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the Azure backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AzureBackendError {
    /// Raised when the high-level configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when no access token could be obtained.
    #[error("credential {source_name} failed: {message}")]
    Credential {
        /// Credential that was attempted (for example `client secret`).
        source_name: String,
        /// Failure description.
        message: String,
    },
    /// Raised when the request never produced an HTTP response.
    #[error("request to {resource} failed: {message}")]
    Transport {
        /// Resource being addressed.
        resource: String,
        /// Message returned by the HTTP client.
        message: String,
    },
    /// Raised on 401 and 403 responses.
    #[error("not authorised to access {resource}: {code}: {message}")]
    Unauthorized {
        /// Resource being addressed.
        resource: String,
        /// ARM error code.
        code: String,
        /// ARM error message.
        message: String,
    },
    /// Raised on 404 responses.
    #[error("{resource} not found: {message}")]
    NotFound {
        /// Resource being addressed.
        resource: String,
        /// ARM error message.
        message: String,
    },
    /// Raised on 429 responses.
    #[error("requests to {resource} throttled (retry after {retry_after_secs:?}s)")]
    Throttled {
        /// Resource being addressed.
        resource: String,
        /// Value of the `Retry-After` header, when present.
        retry_after_secs: Option<u64>,
    },
    /// Raised on any other non-success response.
    #[error("{resource} returned status {status}: {code}: {message}")]
    Api {
        /// Resource being addressed.
        resource: String,
        /// HTTP status.
        status: u16,
        /// ARM error code.
        code: String,
        /// ARM error message.
        message: String,
    },
    /// Raised when a success response cannot be decoded.
    #[error("failed to decode {resource} response: {message}")]
    Decode {
        /// Resource being addressed.
        resource: String,
        /// Decoder message.
        message: String,
    },
}

impl From<ConfigError> for AzureBackendError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
