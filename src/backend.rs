//! Control-plane abstraction for querying VM power state and starting jobs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Status code prefix that marks the power-state entry of an instance view.
pub const POWER_STATE_PREFIX: &str = "PowerState/";

/// Exact status code reported for a running virtual machine.
pub const RUNNING_CODE: &str = "PowerState/running";

/// Identifies a virtual machine within the configured subscription.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VmRef {
    /// Resource group containing the VM.
    pub resource_group: String,
    /// VM name.
    pub name: String,
}

impl VmRef {
    /// Creates a reference from its parts.
    #[must_use]
    pub fn new(resource_group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for VmRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.name)
    }
}

/// Identifies a Container Apps job within the configured subscription.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobRef {
    /// Resource group containing the job.
    pub resource_group: String,
    /// Job name.
    pub name: String,
}

impl JobRef {
    /// Creates a reference from its parts.
    #[must_use]
    pub fn new(resource_group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.name)
    }
}

/// One status entry of an instance view.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceStatus {
    /// Machine readable code such as `PowerState/running`.
    pub code: Option<String>,
    /// Severity reported by the provider (`Info`, `Warning`, `Error`).
    pub level: Option<String>,
    /// Human readable label such as `VM running`.
    pub display_status: Option<String>,
}

impl InstanceStatus {
    /// Builds a status with a code and display label.
    #[must_use]
    pub fn new(code: impl Into<String>, display_status: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            level: Some(String::from("Info")),
            display_status: Some(display_status.into()),
        }
    }
}

/// Runtime view of a virtual machine as reported by the provider.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceView {
    /// All status entries, provisioning and power state included.
    pub statuses: Vec<InstanceStatus>,
}

impl InstanceView {
    /// Returns the first status whose code starts with `PowerState/`.
    #[must_use]
    pub fn power_status(&self) -> Option<PowerStatus> {
        self.statuses.iter().find_map(|status| {
            let code = status.code.as_deref()?;
            code.starts_with(POWER_STATE_PREFIX).then(|| PowerStatus {
                state: PowerState::from_code(code),
                code: code.to_owned(),
                display_status: status.display_status.clone(),
            })
        })
    }
}

/// Power state of a virtual machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PowerState {
    /// The VM is running.
    Running,
    /// The VM is booting.
    Starting,
    /// The VM is shutting down but still allocated.
    Stopping,
    /// The VM is stopped and still allocated.
    Stopped,
    /// The VM is releasing its compute allocation.
    Deallocating,
    /// The VM is stopped and its compute allocation released.
    Deallocated,
    /// Any other suffix, kept verbatim.
    Unknown(String),
}

impl PowerState {
    /// Parses a full status code. Codes without the `PowerState/` prefix map
    /// to [`PowerState::Unknown`].
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.strip_prefix(POWER_STATE_PREFIX) {
            Some("running") => Self::Running,
            Some("starting") => Self::Starting,
            Some("stopping") => Self::Stopping,
            Some("stopped") => Self::Stopped,
            Some("deallocating") => Self::Deallocating,
            Some("deallocated") => Self::Deallocated,
            Some(other) => Self::Unknown(other.to_owned()),
            None => Self::Unknown(code.to_owned()),
        }
    }
}

/// Power-state entry extracted from an instance view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PowerStatus {
    /// Raw status code, for example `PowerState/deallocated`.
    pub code: String,
    /// Parsed state.
    pub state: PowerState,
    /// Display label, for example `VM deallocated`.
    pub display_status: Option<String>,
}

impl PowerStatus {
    /// True only for the exact `PowerState/running` code.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.code == RUNNING_CODE
    }

    /// Display label, falling back to the raw code.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_status.as_deref().unwrap_or(&self.code)
    }
}

/// Acknowledgement that a job start request was accepted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JobStartReceipt {
    /// HTTP status returned by the provider (200 or 202).
    pub status: u16,
    /// URL of the long-running operation, when the provider returns one.
    pub operation_url: Option<String>,
    /// Name of the created execution, when the provider returns one.
    pub execution_name: Option<String>,
}

/// Future returned by control-plane operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud control planes.
pub trait ControlPlane {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the runtime instance view of a virtual machine.
    fn instance_view<'a>(&'a self, vm: &'a VmRef)
    -> BackendFuture<'a, InstanceView, Self::Error>;

    /// Requests a job start and returns once the request is accepted. The
    /// execution itself is not awaited.
    fn start_job<'a>(&'a self, job: &'a JobRef)
    -> BackendFuture<'a, JobStartReceipt, Self::Error>;
}
