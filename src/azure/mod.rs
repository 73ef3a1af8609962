//! Azure Resource Manager implementation of the control-plane contract.
//!
//! Only two ARM operations are needed: the compute `instanceView` query and
//! the Container Apps job `start` action. Both are plain REST calls made with
//! `reqwest`; the long-running start operation is never polled.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, Url};
use tokio::sync::Mutex;

mod credential;
mod error;
mod types;

pub use credential::{Credential, IMDS_TOKEN_ENDPOINT};
pub use error::AzureBackendError;

use self::credential::AccessToken;
use self::types::{ArmErrorEnvelope, InstanceViewBody, JobExecutionBody};
use crate::backend::{BackendFuture, ControlPlane, InstanceView, JobRef, JobStartReceipt, VmRef};
use crate::config::{AzureConfig, ManagedIdentityConfig};

/// API version used for `Microsoft.Compute/virtualMachines`.
pub const COMPUTE_API_VERSION: &str = "2024-07-01";

/// API version used for `Microsoft.App/jobs`.
pub const CONTAINER_APPS_API_VERSION: &str = "2024-03-01";

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
const LOCATION_HEADER: &str = "location";

/// Resource Manager client for the gated VM and the Container Apps job.
#[derive(Debug)]
pub struct AzureBackend {
    client: reqwest::Client,
    credential: Credential,
    management_endpoint: Url,
    subscription_id: String,
    token: Mutex<Option<AccessToken>>,
}

impl AzureBackend {
    /// Validates configuration and selects a credential from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`AzureBackendError::Config`] when a required value is missing
    /// or the management endpoint is not a valid base URL.
    pub fn new(
        config: &AzureConfig,
        identity: &ManagedIdentityConfig,
    ) -> Result<Self, AzureBackendError> {
        Self::with_credential(config, Credential::from_config(config, identity))
    }

    /// Builds a backend with an explicit credential.
    ///
    /// # Errors
    ///
    /// Returns [`AzureBackendError::Config`] when validation fails.
    pub fn with_credential(
        config: &AzureConfig,
        credential: Credential,
    ) -> Result<Self, AzureBackendError> {
        config.validate()?;
        let management_endpoint = Url::parse(config.management_endpoint.trim()).map_err(|err| {
            AzureBackendError::Config(format!(
                "invalid AZURE_MANAGEMENT_ENDPOINT '{}': {err}",
                config.management_endpoint
            ))
        })?;
        if management_endpoint.cannot_be_a_base() {
            return Err(AzureBackendError::Config(format!(
                "AZURE_MANAGEMENT_ENDPOINT '{management_endpoint}' cannot be used as a base URL"
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            credential,
            management_endpoint,
            subscription_id: config.subscription_id.trim().to_owned(),
            token: Mutex::new(None),
        })
    }

    /// Credential used for Resource Manager calls.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// URL of the compute `instanceView` query for `vm`.
    #[must_use]
    pub fn instance_view_url(&self, vm: &VmRef) -> Url {
        self.resource_url(
            &vm.resource_group,
            &[
                "Microsoft.Compute",
                "virtualMachines",
                vm.name.as_str(),
                "instanceView",
            ],
            COMPUTE_API_VERSION,
        )
    }

    /// URL of the Container Apps job `start` action for `job`.
    #[must_use]
    pub fn job_start_url(&self, job: &JobRef) -> Url {
        self.resource_url(
            &job.resource_group,
            &["Microsoft.App", "jobs", job.name.as_str(), "start"],
            CONTAINER_APPS_API_VERSION,
        )
    }

    fn resource_url(&self, resource_group: &str, tail: &[&str], api_version: &str) -> Url {
        let mut url = self.management_endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "subscriptions",
                self.subscription_id.as_str(),
                "resourceGroups",
                resource_group,
                "providers",
            ]);
            segments.extend(tail);
        }
        url.query_pairs_mut().append_pair("api-version", api_version);
        url
    }

    /// Returns a cached token or fetches a new one when it is close to expiry.
    async fn bearer_token(&self) -> Result<String, AzureBackendError> {
        let mut cached = self.token.lock().await;
        let now = std::time::Instant::now();
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(now)) {
            return Ok(token.secret.clone());
        }

        let token = self.credential.fetch(&self.client).await?;
        let secret = token.secret.clone();
        *cached = Some(token);
        Ok(secret)
    }

    async fn fetch_instance_view(&self, vm: &VmRef) -> Result<InstanceView, AzureBackendError> {
        let resource = format!("virtual machine {vm}");
        let token = self.bearer_token().await?;
        let response = self
            .client
            .get(self.instance_view_url(vm))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| transport(&resource, &err))?;
        let response = check_response(response, &resource).await?;

        let body: InstanceViewBody =
            response
                .json()
                .await
                .map_err(|err| AzureBackendError::Decode {
                    resource,
                    message: err.to_string(),
                })?;
        Ok(body.into())
    }

    async fn request_job_start(&self, job: &JobRef) -> Result<JobStartReceipt, AzureBackendError> {
        let resource = format!("container apps job {job}");
        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(self.job_start_url(job))
            .bearer_auth(token)
            .json(&serde_json::Map::new())
            .send()
            .await
            .map_err(|err| transport(&resource, &err))?;
        let response = check_response(response, &resource).await?;

        let status = response.status().as_u16();
        let operation_url = operation_url(response.headers());
        // The execution body is informational; an empty or odd body still
        // means the start was accepted.
        let body = response.text().await.unwrap_or_default();
        let execution_name = serde_json::from_str::<JobExecutionBody>(&body)
            .ok()
            .and_then(|execution| execution.name);

        Ok(JobStartReceipt {
            status,
            operation_url,
            execution_name,
        })
    }
}

impl ControlPlane for AzureBackend {
    type Error = AzureBackendError;

    fn instance_view<'a>(
        &'a self,
        vm: &'a VmRef,
    ) -> BackendFuture<'a, InstanceView, Self::Error> {
        Box::pin(self.fetch_instance_view(vm))
    }

    fn start_job<'a>(&'a self, job: &'a JobRef) -> BackendFuture<'a, JobStartReceipt, Self::Error> {
        Box::pin(self.request_job_start(job))
    }
}

fn transport(resource: &str, err: &reqwest::Error) -> AzureBackendError {
    AzureBackendError::Transport {
        resource: resource.to_owned(),
        message: err.to_string(),
    }
}

fn operation_url(headers: &HeaderMap) -> Option<String> {
    [ASYNC_OPERATION_HEADER, LOCATION_HEADER]
        .into_iter()
        .find_map(|name| headers.get(name)?.to_str().ok().map(str::to_owned))
}

/// Maps a non-success ARM response onto a typed error.
async fn check_response(response: Response, resource: &str) -> Result<Response, AzureBackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok());
    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ArmErrorEnvelope>(&body) {
        Ok(envelope) => (
            envelope
                .error
                .code
                .unwrap_or_else(|| status.as_str().to_owned()),
            envelope.error.message.unwrap_or_default(),
        ),
        Err(_) => (status.as_str().to_owned(), body),
    };

    let resource = resource.to_owned();
    Err(match status.as_u16() {
        401 | 403 => AzureBackendError::Unauthorized {
            resource,
            code,
            message,
        },
        404 => AzureBackendError::NotFound { resource, message },
        429 => AzureBackendError::Throttled {
            resource,
            retry_after_secs,
        },
        other => AzureBackendError::Api {
            resource,
            status: other,
            code,
            message,
        },
    })
}
