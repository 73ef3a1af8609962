//! Scheduled service loop driving the trigger.
//!
//! The loop sleeps until the next firing of its [`CronSchedule`], runs one
//! invocation to completion and repeats. Shutdown is only observed while
//! sleeping, so an invocation in flight always finishes. Invocation failures
//! are logged and reported by the trigger and never stop the loop.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::backend::ControlPlane;
use crate::schedule::CronSchedule;
use crate::telemetry::ErrorReporter;
use crate::trigger::{JobTrigger, TriggerOutcome};

/// Errors that stop the service.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ServiceError {
    /// Raised when the schedule has no further firing.
    #[error("schedule `{expression}` has no upcoming firing")]
    ScheduleExhausted {
        /// Schedule expression.
        expression: String,
    },
}

/// Counters describing a completed service run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ServiceSummary {
    /// Invocations performed.
    pub invocations: u64,
    /// Invocations that started the job.
    pub started: u64,
    /// Invocations that skipped because the VM was not running.
    pub skipped: u64,
    /// Invocations that ended in an error.
    pub failed: u64,
}

/// Runs a [`JobTrigger`] on a cron schedule.
#[derive(Debug)]
pub struct TriggerService<B, R> {
    trigger: JobTrigger<B, R>,
    schedule: CronSchedule,
    run_on_startup: bool,
}

impl<B, R> TriggerService<B, R>
where
    B: ControlPlane,
    R: ErrorReporter,
{
    /// Creates a service that waits for the first scheduled firing.
    #[must_use]
    pub const fn new(trigger: JobTrigger<B, R>, schedule: CronSchedule) -> Self {
        Self {
            trigger,
            schedule,
            run_on_startup: false,
        }
    }

    /// Also runs one invocation immediately when the service starts.
    #[must_use]
    pub const fn with_run_on_startup(mut self, enabled: bool) -> Self {
        self.run_on_startup = enabled;
        self
    }

    /// Schedule driving the service.
    #[must_use]
    pub const fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    /// Runs until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ScheduleExhausted`] when the schedule stops
    /// producing firings.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<ServiceSummary, ServiceError>
    where
        F: Future<Output = ()>,
    {
        let mut summary = ServiceSummary::default();
        tokio::pin!(shutdown);

        tracing::info!(schedule = %self.schedule, "Trigger service started");
        if self.run_on_startup {
            self.fire(Utc::now(), &mut summary).await;
        }

        let mut last_fired: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let reference = last_fired.map_or(now, |fired| fired.max(now));
            let next = self.schedule.next_after(reference).ok_or_else(|| {
                ServiceError::ScheduleExhausted {
                    expression: self.schedule.expression().to_owned(),
                }
            })?;
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next = %next, "Waiting for next scheduled invocation");

            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = tokio::time::sleep(delay) => {}
            }

            last_fired = Some(next);
            self.fire(next, &mut summary).await;
        }

        tracing::info!(
            invocations = summary.invocations,
            started = summary.started,
            skipped = summary.skipped,
            failed = summary.failed,
            "Trigger service stopped"
        );
        Ok(summary)
    }

    async fn fire(&self, scheduled: DateTime<Utc>, summary: &mut ServiceSummary) {
        summary.invocations += 1;
        tracing::info!(scheduled = %scheduled, "Timer trigger function started");
        match self.trigger.invoke().await {
            Ok(TriggerOutcome::Started { .. }) => summary.started += 1,
            Ok(TriggerOutcome::Skipped { .. }) => summary.skipped += 1,
            // Already logged and reported by the trigger.
            Err(_) => summary.failed += 1,
        }
    }
}
