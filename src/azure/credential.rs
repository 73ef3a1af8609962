//! Access token acquisition for Azure Resource Manager.
//!
//! Mirrors the order of the SDK default credential chain that matters for a
//! scheduled worker: a service principal from the environment, then the App
//! Service managed identity endpoint, then the instance metadata service.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::error::AzureBackendError;
use super::types::TokenResponse;
use crate::config::{AzureConfig, ManagedIdentityConfig};

/// Default IMDS token endpoint reachable from Azure VMs and containers.
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const ARM_RESOURCE: &str = "https://management.azure.com/";
const ARM_SCOPE: &str = "https://management.azure.com/.default";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_API_VERSION: &str = "2018-02-01";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// How the backend authenticates against Resource Manager.
#[derive(Clone, Eq, PartialEq)]
pub enum Credential {
    /// Service principal with a client secret.
    ClientSecret {
        /// Authority host, for example `https://login.microsoftonline.com`.
        authority_host: String,
        /// Entra tenant id.
        tenant_id: String,
        /// Application id.
        client_id: String,
        /// Client secret.
        client_secret: String,
    },
    /// App Service / Functions managed identity.
    AppServiceIdentity {
        /// Value of `IDENTITY_ENDPOINT`.
        endpoint: String,
        /// Value of `IDENTITY_HEADER`.
        header: String,
        /// User-assigned identity client id.
        client_id: Option<String>,
    },
    /// Instance metadata service managed identity.
    ImdsIdentity {
        /// Token endpoint, normally [`IMDS_TOKEN_ENDPOINT`].
        endpoint: String,
        /// User-assigned identity client id.
        client_id: Option<String>,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("authority_host", authority_host)
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Self::AppServiceIdentity {
                endpoint,
                client_id,
                ..
            } => f
                .debug_struct("AppServiceIdentity")
                .field("endpoint", endpoint)
                .field("header", &"<redacted>")
                .field("client_id", client_id)
                .finish(),
            Self::ImdsIdentity {
                endpoint,
                client_id,
            } => f
                .debug_struct("ImdsIdentity")
                .field("endpoint", endpoint)
                .field("client_id", client_id)
                .finish(),
        }
    }
}

impl Credential {
    /// Picks the first credential the environment can satisfy.
    #[must_use]
    pub fn from_config(azure: &AzureConfig, identity: &ManagedIdentityConfig) -> Self {
        if let Some((tenant_id, client_id, client_secret)) = azure.client_secret_parts() {
            return Self::ClientSecret {
                authority_host: azure.authority_host.trim().to_owned(),
                tenant_id: tenant_id.to_owned(),
                client_id: client_id.to_owned(),
                client_secret: client_secret.to_owned(),
            };
        }

        let client_id = azure
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned);

        if let Some((endpoint, header)) = identity.app_service() {
            return Self::AppServiceIdentity {
                endpoint: endpoint.to_owned(),
                header: header.to_owned(),
                client_id,
            };
        }

        Self::ImdsIdentity {
            endpoint: String::from(IMDS_TOKEN_ENDPOINT),
            client_id,
        }
    }

    /// Short name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ClientSecret { .. } => "client secret",
            Self::AppServiceIdentity { .. } => "app service managed identity",
            Self::ImdsIdentity { .. } => "imds managed identity",
        }
    }

    /// Requests a fresh access token for Resource Manager.
    pub(super) async fn fetch(
        &self,
        client: &reqwest::Client,
    ) -> Result<AccessToken, AzureBackendError> {
        let request = match self {
            Self::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                client_secret,
            } => {
                let url = format!(
                    "{}/{tenant_id}/oauth2/v2.0/token",
                    authority_host.trim_end_matches('/')
                );
                client.post(url).form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", ARM_SCOPE),
                ])
            }
            Self::AppServiceIdentity {
                endpoint,
                header,
                client_id,
            } => {
                let mut query = vec![
                    ("resource", ARM_RESOURCE),
                    ("api-version", APP_SERVICE_API_VERSION),
                ];
                if let Some(id) = client_id {
                    query.push(("client_id", id.as_str()));
                }
                client
                    .get(endpoint)
                    .query(&query)
                    .header("X-IDENTITY-HEADER", header)
            }
            Self::ImdsIdentity {
                endpoint,
                client_id,
            } => {
                let mut query = vec![
                    ("resource", ARM_RESOURCE),
                    ("api-version", IMDS_API_VERSION),
                ];
                if let Some(id) = client_id {
                    query.push(("client_id", id.as_str()));
                }
                client
                    .get(endpoint)
                    .query(&query)
                    .header("Metadata", "true")
            }
        };

        let response = request.send().await.map_err(|err| self.failure(err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.failure(format!("token endpoint returned {status}: {body}")));
        }

        let token: TokenResponse = response.json().await.map_err(|err| self.failure(err))?;
        Ok(AccessToken::from_response(token, Instant::now()))
    }

    fn failure(&self, message: impl fmt::Display) -> AzureBackendError {
        AzureBackendError::Credential {
            source_name: self.name().to_owned(),
            message: message.to_string(),
        }
    }
}

/// Bearer token with its local expiry instant.
#[derive(Clone, Eq, PartialEq)]
pub(super) struct AccessToken {
    pub(super) secret: String,
    pub(super) expires_at: Instant,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    /// Converts a token response, preferring `expires_in` over the absolute
    /// `expires_on`. A response with neither is treated as already expired.
    pub(super) fn from_response(response: TokenResponse, now: Instant) -> Self {
        let lifetime = response
            .expires_in
            .as_ref()
            .and_then(super::types::Seconds::value)
            .or_else(|| {
                let expires_on = response
                    .expires_on
                    .as_ref()
                    .and_then(super::types::Seconds::value)?;
                let now_epoch = u64::try_from(Utc::now().timestamp()).ok()?;
                Some(expires_on.saturating_sub(now_epoch))
            })
            .unwrap_or(0);

        Self {
            secret: response.access_token,
            expires_at: now
                .checked_add(Duration::from_secs(lifetime))
                .unwrap_or(now),
        }
    }

    /// Whether the token is still usable at `now`, keeping a refresh margin.
    pub(super) fn is_fresh(&self, now: Instant) -> bool {
        now.checked_add(REFRESH_MARGIN)
            .is_some_and(|deadline| deadline < self.expires_at)
    }
}
