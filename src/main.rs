//! Binary entry point for the `esmos-monitor` CLI.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use esmos_monitor::config::ConfigError;
use esmos_monitor::{
    AzureBackend, AzureBackendError, AzureConfig, BetterStackConfig, CronSchedule, ErrorReporter,
    JobTrigger, LogOnlyReporter, LoggingOptions, ManagedIdentityConfig, MonitorConfig,
    Reachability, ReporterOptions, ScheduleError, SentryReporter, ServiceError,
    SiteProbe, TelemetryError, TriggerError, TriggerService, TriggerTarget, init_global,
    init_logging,
};

mod cli;

use cli::{Cli, ServeCommand};

/// Upper bound on draining logs and error reports before exit.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

type Reporter = Arc<dyn ErrorReporter>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("logging setup failed: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("backend error: {0}")]
    Backend(#[from] AzureBackendError),
    #[error("invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("{0}")]
    Trigger(#[from] TriggerError<AzureBackendError>),
    #[error("service stopped: {0}")]
    Service(#[from] ServiceError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let monitor = MonitorConfig::load_without_cli_args()?;
    let better_stack = BetterStackConfig::load_without_cli_args()?;
    if matches!(cli, Cli::Serve(_)) {
        better_stack.validate()?;
    }

    let log_sink = init_logging(LoggingOptions::from_config(&monitor, &better_stack))?;
    let sentry = init_reporter(better_stack.error_dsn(), &monitor);
    let reporter = select_reporter(sentry);

    let result = match cli {
        Cli::Serve(command) => serve(&command, &monitor, reporter).await,
        Cli::Trigger => trigger_once(reporter).await,
        Cli::Probe => Ok(probe_exit_code(
            &SiteProbe::from_config(&monitor).probe().await,
        )),
    };

    if let Some(reporter) = sentry {
        let delivered = tokio::task::spawn_blocking(move || reporter.flush(FLUSH_TIMEOUT))
            .await
            .unwrap_or(false);
        if !delivered {
            tracing::warn!("Timed out delivering error reports");
        }
    }
    if let Some(handle) = log_sink {
        if !handle.flush(FLUSH_TIMEOUT).await {
            writeln!(io::stderr(), "timed out shipping logs to Better Stack").ok();
        }
    }
    result
}

fn reporter_options(monitor: &MonitorConfig) -> ReporterOptions {
    ReporterOptions {
        environment: monitor.environment.clone(),
        ..ReporterOptions::default()
    }
}

/// A malformed DSN disables error reporting instead of stopping the command.
fn init_reporter(dsn: Option<&str>, monitor: &MonitorConfig) -> Option<&'static SentryReporter> {
    match init_global(dsn?, reporter_options(monitor)) {
        Ok(reporter) => Some(reporter),
        Err(err) => {
            tracing::warn!(error = %err, "Error reporting disabled");
            None
        }
    }
}

fn select_reporter(sentry: Option<&'static SentryReporter>) -> Reporter {
    match sentry {
        Some(reporter) => Arc::new(reporter),
        None => Arc::new(LogOnlyReporter),
    }
}

fn build_trigger(reporter: Reporter) -> Result<JobTrigger<AzureBackend, Reporter>, CliError> {
    let azure = AzureConfig::load_without_cli_args()?;
    let identity = ManagedIdentityConfig::load_without_cli_args()?;
    let backend = AzureBackend::new(&azure, &identity)?;
    tracing::debug!(credential = backend.credential().name(), "Azure credential selected");
    Ok(JobTrigger::new(
        backend,
        reporter,
        TriggerTarget::from_config(&azure),
    ))
}

async fn trigger_once(reporter: Reporter) -> Result<i32, CliError> {
    let trigger = build_trigger(reporter)?;
    trigger.invoke().await?;
    Ok(0)
}

async fn serve(
    command: &ServeCommand,
    monitor: &MonitorConfig,
    reporter: Reporter,
) -> Result<i32, CliError> {
    let schedule = resolve_schedule(command, monitor)?;
    let trigger = build_trigger(reporter)?;
    TriggerService::new(trigger, schedule)
        .with_run_on_startup(command.run_on_startup)
        .run_until(shutdown_signal())
        .await?;
    Ok(0)
}

fn resolve_schedule(
    command: &ServeCommand,
    monitor: &MonitorConfig,
) -> Result<CronSchedule, CliError> {
    let expression = command.schedule.as_deref().unwrap_or(&monitor.schedule);
    Ok(CronSchedule::parse(expression)?)
}

const fn probe_exit_code(reachability: &Reachability) -> i32 {
    if reachability.is_reachable() { 0 } else { 1 }
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
    tracing::info!("Shutdown requested");
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod main_tests;
