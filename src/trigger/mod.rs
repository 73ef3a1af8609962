//! VM-gated job trigger.
//!
//! Each invocation reads the power state of one virtual machine and starts
//! one Container Apps job only when the VM reports `PowerState/running`.
//! Invocations are independent: there is no memory of earlier runs and no
//! de-duplication of starts.

use thiserror::Error;

use crate::backend::{ControlPlane, JobRef, JobStartReceipt, PowerStatus, VmRef};
use crate::config::AzureConfig;
use crate::telemetry::ErrorReporter;

/// The VM that gates the job and the job it gates.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TriggerTarget {
    /// Virtual machine whose power state is checked.
    pub vm: VmRef,
    /// Job started while the VM runs.
    pub job: JobRef,
}

impl TriggerTarget {
    /// Builds the target from validated Azure configuration.
    #[must_use]
    pub fn from_config(config: &AzureConfig) -> Self {
        Self {
            vm: config.vm(),
            job: config.job(),
        }
    }
}

/// Result of a completed invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TriggerOutcome {
    /// The VM was running and the start request was accepted.
    Started {
        /// Power state that allowed the start.
        power: PowerStatus,
        /// Provider acknowledgement.
        receipt: JobStartReceipt,
    },
    /// The VM was not running, or reported no power state at all.
    Skipped {
        /// Power state observed, `None` when the view had no power entry.
        power: Option<PowerStatus>,
    },
}

/// Errors that end an invocation.
#[derive(Debug, Error)]
pub enum TriggerError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when the instance view query fails.
    #[error("failed to query power state of {vm}: {source}")]
    Status {
        /// VM being queried.
        vm: VmRef,
        /// Provider error.
        #[source]
        source: BackendError,
    },
    /// Raised when the job start request fails.
    #[error("failed to start job {job}: {source}")]
    Start {
        /// Job being started.
        job: JobRef,
        /// Provider error.
        #[source]
        source: BackendError,
    },
}

/// Runs the power-state gate against a control plane.
#[derive(Debug)]
pub struct JobTrigger<B, R> {
    backend: B,
    reporter: R,
    target: TriggerTarget,
}

impl<B, R> JobTrigger<B, R>
where
    B: ControlPlane,
    R: ErrorReporter,
{
    /// Creates a trigger.
    #[must_use]
    pub const fn new(backend: B, reporter: R, target: TriggerTarget) -> Self {
        Self {
            backend,
            reporter,
            target,
        }
    }

    /// VM and job this trigger operates on.
    #[must_use]
    pub const fn target(&self) -> &TriggerTarget {
        &self.target
    }

    /// Performs one gate check without reporting failures.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::Status`] when the power state cannot be read
    /// and [`TriggerError::Start`] when the start request is rejected.
    pub async fn run(&self) -> Result<TriggerOutcome, TriggerError<B::Error>> {
        let vm = &self.target.vm;
        let view = self
            .backend
            .instance_view(vm)
            .await
            .map_err(|source| TriggerError::Status {
                vm: vm.clone(),
                source,
            })?;

        let Some(power) = view.power_status() else {
            tracing::warn!(vm = %vm, "VM reported no power state. Skipping execution.");
            return Ok(TriggerOutcome::Skipped { power: None });
        };
        tracing::info!(vm = %vm, code = %power.code, "VM Status: {}", power.label());

        if !power.is_running() {
            tracing::info!(vm = %vm, "VM is not running. Skipping execution.");
            return Ok(TriggerOutcome::Skipped { power: Some(power) });
        }

        let job = &self.target.job;
        tracing::info!(job = %job, "VM is running. Triggering Container App Job...");
        let receipt = self
            .backend
            .start_job(job)
            .await
            .map_err(|source| TriggerError::Start {
                job: job.clone(),
                source,
            })?;
        tracing::info!(
            job = %job,
            status = receipt.status,
            execution = receipt.execution_name.as_deref().unwrap_or("-"),
            "Job successfully triggered."
        );

        Ok(TriggerOutcome::Started { power, receipt })
    }

    /// Performs one gate check and reports a failure exactly once before
    /// handing it back to the caller.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`JobTrigger::run`], after reporting them.
    pub async fn invoke(&self) -> Result<TriggerOutcome, TriggerError<B::Error>> {
        let result = self.run().await;
        if let Err(err) = &result {
            self.reporter.capture_error(err);
            tracing::error!(error = %err, "Error in automation");
        }
        result
    }
}
