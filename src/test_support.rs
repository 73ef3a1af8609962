//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing_subscriber::fmt::MakeWriter;

use crate::backend::{
    BackendFuture, ControlPlane, InstanceStatus, InstanceView, JobRef, JobStartReceipt, VmRef,
};
use crate::telemetry::ErrorReporter;

/// Errors produced by [`ScriptedControlPlane`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedError {
    /// Scripted instance view failure.
    #[error("scripted instance view failure")]
    Status,
    /// Scripted job start failure.
    #[error("scripted job start failure")]
    Start,
    /// Raised when no instance view was queued.
    #[error("no scripted instance view available")]
    Exhausted,
}

#[derive(Debug, Default)]
struct ControlPlaneState {
    views: VecDeque<Result<InstanceView, ScriptedError>>,
    starts: VecDeque<Result<JobStartReceipt, ScriptedError>>,
    status_calls: Vec<VmRef>,
    start_calls: Vec<JobRef>,
}

/// Control plane returning pre-seeded responses in FIFO order and recording
/// every call.
///
/// Job starts succeed with a `202` receipt unless a failure was queued.
#[derive(Clone, Debug, Default)]
pub struct ScriptedControlPlane {
    state: Arc<Mutex<ControlPlaneState>>,
}

impl ScriptedControlPlane {
    /// Creates a control plane with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ControlPlaneState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Queues an instance view with a provisioning entry and one power-state
    /// entry carrying `code`.
    pub fn push_power_state(&self, code: &str) {
        let display = code.strip_prefix("PowerState/").map_or_else(
            || code.to_owned(),
            |suffix| format!("VM {suffix}"),
        );
        self.push_statuses(vec![
            InstanceStatus::new("ProvisioningState/succeeded", "Provisioning succeeded"),
            InstanceStatus::new(code, display),
        ]);
    }

    /// Queues an instance view with explicit statuses.
    pub fn push_statuses(&self, statuses: Vec<InstanceStatus>) {
        self.with_state(|state| state.views.push_back(Ok(InstanceView { statuses })));
    }

    /// Queues an instance view failure.
    pub fn push_status_failure(&self) {
        self.with_state(|state| state.views.push_back(Err(ScriptedError::Status)));
    }

    /// Queues a job start failure.
    pub fn push_start_failure(&self) {
        self.with_state(|state| state.starts.push_back(Err(ScriptedError::Start)));
    }

    /// VMs queried so far.
    #[must_use]
    pub fn status_calls(&self) -> Vec<VmRef> {
        self.with_state(|state| state.status_calls.clone())
    }

    /// Jobs started so far.
    #[must_use]
    pub fn start_calls(&self) -> Vec<JobRef> {
        self.with_state(|state| state.start_calls.clone())
    }
}

impl ControlPlane for ScriptedControlPlane {
    type Error = ScriptedError;

    fn instance_view<'a>(
        &'a self,
        vm: &'a VmRef,
    ) -> BackendFuture<'a, InstanceView, Self::Error> {
        let result = self.with_state(|state| {
            state.status_calls.push(vm.clone());
            state
                .views
                .pop_front()
                .unwrap_or(Err(ScriptedError::Exhausted))
        });
        Box::pin(async move { result })
    }

    fn start_job<'a>(&'a self, job: &'a JobRef) -> BackendFuture<'a, JobStartReceipt, Self::Error> {
        let result = self.with_state(|state| {
            state.start_calls.push(job.clone());
            state.starts.pop_front().unwrap_or_else(|| {
                Ok(JobStartReceipt {
                    status: 202,
                    operation_url: None,
                    execution_name: Some(format!("{}-scripted", job.name)),
                })
            })
        });
        Box::pin(async move { result })
    }
}

/// Reporter that keeps the rendered text of every captured error.
#[derive(Clone, Debug, Default)]
pub struct RecordingReporter {
    captured: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors captured so far.
    #[must_use]
    pub fn captured(&self) -> Vec<String> {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn capture_error(&self, error: &(dyn StdError + 'static)) {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.to_string());
    }
}

/// In-memory log destination for asserting on emitted lines.
#[derive(Clone, Debug, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

/// Writer handed out by [`LogCapture`].
#[derive(Debug)]
pub struct LogCaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl LogCapture {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain-text subscriber writing into this capture. Install it with
    /// `tracing::subscriber::set_default`.
    #[must_use]
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + use<> {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::TRACE)
            .finish()
    }

    /// Everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
            .into_owned()
    }

    /// Lines emitted at `level` (for example `"ERROR"`).
    #[must_use]
    pub fn lines_at(&self, level: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.trim_start().starts_with(level))
            .map(str::to_owned)
            .collect()
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    /// `None` values remove the variable.
    pub async fn apply(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::apply"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let pairs: Vec<(&str, Option<&str>)> =
            pairs.iter().map(|(key, value)| (*key, Some(*value))).collect();
        Self::apply(&pairs).await
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
