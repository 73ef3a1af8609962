//! Configuration loading via `ortho-config`.
//!
//! Each concern reads its own environment prefix so the variable names match
//! the ones the deployment already exports (`AZURE_*`, `BETTER_STACK_*`,
//! `ESMOS_*`, `IDENTITY_*`).

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::backend::{JobRef, VmRef};

/// Default ARM endpoint for the public Azure cloud.
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Default Microsoft identity platform authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Timer schedule used when `ESMOS_SCHEDULE` is not set: second zero of every
/// tenth minute.
pub const DEFAULT_SCHEDULE: &str = "0 */10 * * * *";

/// Environment mode that enables colourised console output.
pub const DEVELOPMENT_ENVIRONMENT: &str = "development";

/// Azure subscription, resource and credential settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "AZURE")]
pub struct AzureConfig {
    /// Subscription holding both the VM and the Container Apps job.
    #[ortho_config(default = String::new())]
    pub subscription_id: String,
    /// Resource group containing the gated virtual machine.
    #[ortho_config(default = String::new())]
    pub vm_resource_group: String,
    /// Resource group containing the Container Apps job.
    #[ortho_config(default = String::new())]
    pub aca_resource_group: String,
    /// Name of the virtual machine whose power state gates the job.
    #[ortho_config(default = String::new())]
    pub vm_name: String,
    /// Name of the Container Apps job to start.
    #[ortho_config(default = String::new())]
    pub aca_job_name: String,
    /// Entra tenant used for the client secret credential.
    pub tenant_id: Option<String>,
    /// Application (client) id. Also selects a user-assigned managed
    /// identity when no client secret is configured.
    pub client_id: Option<String>,
    /// Client secret for service principal authentication.
    pub client_secret: Option<String>,
    /// Resource Manager endpoint. Overridden for sovereign clouds and tests.
    #[ortho_config(default = DEFAULT_MANAGEMENT_ENDPOINT.to_owned())]
    pub management_endpoint: String,
    /// Authority host used for token requests.
    #[ortho_config(default = DEFAULT_AUTHORITY_HOST.to_owned())]
    pub authority_host: String,
}

/// App Service managed identity variables injected by the platform.
#[derive(Clone, Debug, Default, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "IDENTITY")]
pub struct ManagedIdentityConfig {
    /// Local token endpoint (`IDENTITY_ENDPOINT`).
    pub endpoint: Option<String>,
    /// Shared secret sent as `X-IDENTITY-HEADER` (`IDENTITY_HEADER`).
    pub header: Option<String>,
}

/// Better Stack credentials for log and error ingestion.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "BETTER_STACK")]
pub struct BetterStackConfig {
    /// Source token sent as a bearer token with log batches.
    #[ortho_config(default = String::new())]
    pub logs_token: String,
    /// Ingestion host for logs, with or without a scheme.
    #[ortho_config(default = String::new())]
    pub logs_dsn: String,
    /// Sentry-compatible DSN for error reports.
    #[ortho_config(default = String::new())]
    pub error_dsn: String,
}

/// Monitor-level settings: probe target, environment mode and schedule.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "ESMOS")]
pub struct MonitorConfig {
    /// Site checked by the reachability probe.
    pub url: Option<String>,
    /// Deployment environment; `development` enables ANSI colours.
    pub environment: Option<String>,
    /// Six-field cron expression driving the trigger.
    #[ortho_config(default = DEFAULT_SCHEDULE.to_owned())]
    pub schedule: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str) -> Self {
        Self {
            description,
            env_var,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {}",
            metadata.description, metadata.env_var
        )));
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|trimmed| !trimmed.is_empty())
}

impl AzureConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("esmos-monitor")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks that every value the trigger needs is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the first absent variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.subscription_id,
            &FieldMetadata::new("Azure subscription ID", "AZURE_SUBSCRIPTION_ID"),
        )?;
        require_field(
            &self.vm_resource_group,
            &FieldMetadata::new("VM resource group", "AZURE_VM_RESOURCE_GROUP"),
        )?;
        require_field(
            &self.aca_resource_group,
            &FieldMetadata::new(
                "Container Apps resource group",
                "AZURE_ACA_RESOURCE_GROUP",
            ),
        )?;
        require_field(
            &self.vm_name,
            &FieldMetadata::new("virtual machine name", "AZURE_VM_NAME"),
        )?;
        require_field(
            &self.aca_job_name,
            &FieldMetadata::new("Container Apps job name", "AZURE_ACA_JOB_NAME"),
        )?;
        require_field(
            &self.management_endpoint,
            &FieldMetadata::new("Resource Manager endpoint", "AZURE_MANAGEMENT_ENDPOINT"),
        )?;
        require_field(
            &self.authority_host,
            &FieldMetadata::new("authority host", "AZURE_AUTHORITY_HOST"),
        )?;
        Ok(())
    }

    /// Identifies the gated virtual machine.
    #[must_use]
    pub fn vm(&self) -> VmRef {
        VmRef::new(self.vm_resource_group.trim(), self.vm_name.trim())
    }

    /// Identifies the Container Apps job to start.
    #[must_use]
    pub fn job(&self) -> JobRef {
        JobRef::new(self.aca_resource_group.trim(), self.aca_job_name.trim())
    }

    /// Returns the service principal triple when all three parts are set.
    #[must_use]
    pub fn client_secret_parts(&self) -> Option<(&str, &str, &str)> {
        let tenant = non_blank(self.tenant_id.as_deref())?;
        let client = non_blank(self.client_id.as_deref())?;
        let secret = non_blank(self.client_secret.as_deref())?;
        Some((tenant, client, secret))
    }
}

impl ManagedIdentityConfig {
    /// Loads the App Service identity variables from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("esmos-monitor")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the endpoint and header when both are present.
    #[must_use]
    pub fn app_service(&self) -> Option<(&str, &str)> {
        let endpoint = non_blank(self.endpoint.as_deref())?;
        let header = non_blank(self.header.as_deref())?;
        Some((endpoint, header))
    }
}

impl BetterStackConfig {
    /// Loads Better Stack credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("esmos-monitor")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Requires every sink credential; used by the scheduled service, which
    /// must not run without its log and error destinations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the first absent variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.logs_token,
            &FieldMetadata::new("Better Stack logs source token", "BETTER_STACK_LOGS_TOKEN"),
        )?;
        require_field(
            &self.logs_dsn,
            &FieldMetadata::new("Better Stack logs ingestion host", "BETTER_STACK_LOGS_DSN"),
        )?;
        require_field(
            &self.error_dsn,
            &FieldMetadata::new("Better Stack error DSN", "BETTER_STACK_ERROR_DSN"),
        )?;
        Ok(())
    }

    /// Returns `(endpoint, token)` when log shipping is configured.
    #[must_use]
    pub fn log_sink(&self) -> Option<(String, String)> {
        let token = non_blank(Some(&self.logs_token))?;
        let dsn = non_blank(Some(&self.logs_dsn))?;
        let endpoint = if dsn.starts_with("http://") || dsn.starts_with("https://") {
            dsn.to_owned()
        } else {
            format!("https://{dsn}")
        };
        Some((endpoint, token.to_owned()))
    }

    /// Returns the error DSN when set.
    #[must_use]
    pub fn error_dsn(&self) -> Option<&str> {
        non_blank(Some(&self.error_dsn))
    }
}

impl MonitorConfig {
    /// Loads monitor settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("esmos-monitor")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Probe target, with blank values treated as absent.
    #[must_use]
    pub fn site_url(&self) -> Option<&str> {
        non_blank(self.url.as_deref())
    }

    /// Whether console output should be colourised.
    #[must_use]
    pub fn is_development(&self) -> bool {
        non_blank(self.environment.as_deref())
            .is_some_and(|env| env.eq_ignore_ascii_case(DEVELOPMENT_ENVIRONMENT))
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
