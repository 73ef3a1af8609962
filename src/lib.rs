//! Core library for the ESMOS monitor.
//!
//! The crate exposes a control-plane abstraction for reading virtual machine
//! power state and starting Container Apps jobs, an Azure Resource Manager
//! implementation of it, and the gate that starts the job only while the VM
//! runs. Around that sit a cron-driven service loop, an HTTP reachability
//! probe, and the logging and error-reporting adapters.

pub mod azure;
pub mod backend;
pub mod config;
pub mod probe;
pub mod schedule;
pub mod service;
pub mod telemetry;
pub mod test_support;
pub mod trigger;

pub use azure::{AzureBackend, AzureBackendError, Credential};
pub use backend::{
    BackendFuture, ControlPlane, InstanceStatus, InstanceView, JobRef, JobStartReceipt,
    PowerState, PowerStatus, VmRef,
};
pub use config::{AzureConfig, BetterStackConfig, ManagedIdentityConfig, MonitorConfig};
pub use probe::{PROBE_TIMEOUT, Reachability, SiteProbe};
pub use schedule::{CronSchedule, ScheduleError};
pub use service::{ServiceError, ServiceSummary, TriggerService};
pub use telemetry::{
    ErrorReporter, LogOnlyReporter, LogSinkHandle, LoggingOptions, RELEASE, ReporterError,
    ReporterOptions, SentryReporter, TelemetryError, init_global, init_logging,
};
pub use trigger::{JobTrigger, TriggerError, TriggerOutcome, TriggerTarget};
