//! Unit tests for the `esmos-monitor` CLI binary implementation.

use super::*;
use rstest::rstest;

fn monitor(schedule: &str) -> MonitorConfig {
    MonitorConfig {
        url: None,
        environment: Some(String::from("production")),
        schedule: schedule.to_owned(),
    }
}

#[test]
fn schedule_flag_overrides_configuration() {
    let command = ServeCommand {
        schedule: Some(String::from("*/30 * * * * *")),
        run_on_startup: false,
    };

    let schedule = resolve_schedule(&command, &monitor("0 */10 * * * *")).expect("schedule");

    assert_eq!(schedule.expression(), "*/30 * * * * *");
}

#[test]
fn configured_schedule_is_used_without_flag() {
    let command = ServeCommand {
        schedule: None,
        run_on_startup: true,
    };

    let schedule = resolve_schedule(&command, &monitor("0 0 * * * *")).expect("schedule");

    assert_eq!(schedule.expression(), "0 0 * * * *");
}

#[test]
fn invalid_schedule_is_a_cli_error() {
    let command = ServeCommand {
        schedule: Some(String::from("*/10 * * * *")),
        run_on_startup: false,
    };

    let err = resolve_schedule(&command, &monitor("0 */10 * * * *")).expect_err("invalid");

    assert!(matches!(err, CliError::Schedule(_)), "got {err:?}");
    assert!(err.to_string().starts_with("invalid schedule:"), "{err}");
}

#[rstest]
#[case(Reachability::Reachable { status: 200 }, 0)]
#[case(Reachability::Unreachable { status: 503 }, 1)]
#[case(Reachability::TimedOut, 1)]
#[case(Reachability::NotConfigured, 1)]
#[case(Reachability::Failed { cause: String::from("refused") }, 1)]
fn probe_exit_code_follows_reachability(#[case] reachability: Reachability, #[case] code: i32) {
    assert_eq!(probe_exit_code(&reachability), code);
}

#[test]
fn reporter_options_carry_environment_and_release() {
    let options = reporter_options(&monitor("0 */10 * * * *"));

    assert_eq!(options.environment.as_deref(), Some("production"));
    assert_eq!(options.release, esmos_monitor::RELEASE);
}

#[test]
fn write_error_writes_cli_error() {
    let mut buf = Vec::new();
    let err = CliError::Config(ConfigError::MissingField(String::from(
        "missing Azure subscription ID: set AZURE_SUBSCRIPTION_ID",
    )));
    write_error(&mut buf, &err);
    let rendered = String::from_utf8(buf).expect("utf8");
    assert!(
        rendered.contains("AZURE_SUBSCRIPTION_ID"),
        "rendered: {rendered}"
    );
}

#[rstest]
#[case(None)]
#[case(Some("not-a-dsn"))]
fn missing_or_malformed_dsn_falls_back_to_log_only(#[case] dsn: Option<&str>) {
    assert!(init_reporter(dsn, &monitor("0 */10 * * * *")).is_none());
}
