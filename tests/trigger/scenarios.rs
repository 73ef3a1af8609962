//! BDD scenarios for the trigger workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{TriggerContext, trigger_context};

#[scenario(
    path = "tests/features/trigger.feature",
    name = "Start the job while the VM is running"
)]
fn scenario_running_vm(trigger_context: TriggerContext) {
    drop(trigger_context);
}

#[scenario(
    path = "tests/features/trigger.feature",
    name = "Skip the job while the VM is deallocated"
)]
fn scenario_deallocated_vm(trigger_context: TriggerContext) {
    drop(trigger_context);
}

#[scenario(
    path = "tests/features/trigger.feature",
    name = "Skip the job when the VM reports no power state"
)]
fn scenario_missing_power_state(trigger_context: TriggerContext) {
    drop(trigger_context);
}

#[scenario(
    path = "tests/features/trigger.feature",
    name = "Report power state failures"
)]
fn scenario_status_failure(trigger_context: TriggerContext) {
    drop(trigger_context);
}

#[scenario(
    path = "tests/features/trigger.feature",
    name = "Report job start failures"
)]
fn scenario_start_failure(trigger_context: TriggerContext) {
    drop(trigger_context);
}
