//! Shared fixtures for trigger BDD scenarios.

use esmos_monitor::test_support::{RecordingReporter, ScriptedControlPlane};
use esmos_monitor::{JobRef, TriggerTarget, VmRef};
use rstest::fixture;

#[derive(Clone, Debug)]
pub struct TriggerContext {
    pub backend: ScriptedControlPlane,
    pub reporter: RecordingReporter,
    pub target: TriggerTarget,
    pub outcome: Option<TriggerResult>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TriggerResult {
    Started,
    Skipped,
    Failed(String),
}

#[fixture]
pub fn trigger_context() -> TriggerContext {
    TriggerContext {
        backend: ScriptedControlPlane::new(),
        reporter: RecordingReporter::new(),
        target: TriggerTarget {
            vm: VmRef::new("rg-esmos-prod", "vm-esmos"),
            job: JobRef::new("rg-esmos-tests", "job-e2e"),
        },
        outcome: None,
    }
}
