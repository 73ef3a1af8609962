//! BDD step definitions for the trigger workflow.

use esmos_monitor::{InstanceStatus, JobTrigger, TriggerOutcome};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{TriggerContext, TriggerResult};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("runtime setup failed: {0}")]
    Setup(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a monitored VM and job")]
fn monitored_vm(trigger_context: TriggerContext) -> TriggerContext {
    trigger_context
}

#[given("the VM reports power state \"{code}\"")]
fn vm_reports_power_state(trigger_context: TriggerContext, code: String) -> TriggerContext {
    trigger_context.backend.push_power_state(&code);
    trigger_context
}

#[given("the VM reports no power state")]
fn vm_reports_no_power_state(trigger_context: TriggerContext) -> TriggerContext {
    trigger_context
        .backend
        .push_statuses(vec![InstanceStatus::new(
            "ProvisioningState/succeeded",
            "Provisioning succeeded",
        )]);
    trigger_context
}

#[given("the power state query fails")]
fn power_state_query_fails(trigger_context: TriggerContext) -> TriggerContext {
    trigger_context.backend.push_status_failure();
    trigger_context
}

#[given("the job start fails")]
fn job_start_fails(trigger_context: TriggerContext) -> TriggerContext {
    trigger_context.backend.push_start_failure();
    trigger_context
}

#[when("the trigger runs")]
fn trigger_runs(trigger_context: TriggerContext) -> Result<TriggerContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Setup(err.to_string()))?;
    let TriggerContext {
        backend,
        reporter,
        target,
        ..
    } = trigger_context;

    let trigger = JobTrigger::new(backend.clone(), reporter.clone(), target.clone());
    let result = runtime.block_on(async move { trigger.invoke().await });
    let outcome = match result {
        Ok(TriggerOutcome::Started { .. }) => TriggerResult::Started,
        Ok(TriggerOutcome::Skipped { .. }) => TriggerResult::Skipped,
        Err(err) => TriggerResult::Failed(err.to_string()),
    };

    Ok(TriggerContext {
        backend,
        reporter,
        target,
        outcome: Some(outcome),
    })
}

#[then("the job is started \"{count}\" times")]
fn job_started_times(trigger_context: &TriggerContext, count: usize) -> Result<(), StepError> {
    let starts = trigger_context.backend.start_calls();
    if starts.len() == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} job starts, got {starts:?}"
        )))
    }
}

#[then("the invocation is skipped")]
fn invocation_skipped(trigger_context: &TriggerContext) -> Result<(), StepError> {
    match &trigger_context.outcome {
        Some(TriggerResult::Skipped) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected skipped outcome, got {other:?}"
        ))),
    }
}

#[then("no error is reported")]
fn no_error_reported(trigger_context: &TriggerContext) -> Result<(), StepError> {
    let captured = trigger_context.reporter.captured();
    if captured.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no reports, got {captured:?}"
        )))
    }
}

#[then("one error mentioning \"{text}\" is reported")]
fn one_error_reported(trigger_context: &TriggerContext, text: String) -> Result<(), StepError> {
    let Some(TriggerResult::Failed(message)) = &trigger_context.outcome else {
        return Err(StepError::Assertion(format!(
            "expected failed outcome, got {:?}",
            trigger_context.outcome
        )));
    };
    let captured = trigger_context.reporter.captured();
    match captured.as_slice() {
        [report] if report.contains(&text) && report == message => Ok(()),
        _ => Err(StepError::Assertion(format!(
            "expected one report mentioning {text} matching {message}, got {captured:?}"
        ))),
    }
}
