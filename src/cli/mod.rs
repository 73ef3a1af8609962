//! Command-line interface definitions for the `esmos-monitor` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `esmos-monitor` binary.
#[derive(Debug, Parser)]
#[command(
    name = "esmos-monitor",
    version,
    about = "Start the ESMOS test job whenever the ESMOS VM is running",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Run the trigger on a schedule until interrupted.
    #[command(name = "serve", about = "Run the trigger on a schedule until interrupted")]
    Serve(ServeCommand),
    /// Run the trigger once and exit.
    #[command(name = "trigger", about = "Check the VM once and start the job if it is running")]
    Trigger,
    /// Check whether ESMOS_URL answers with a success status.
    #[command(name = "probe", about = "Check whether ESMOS_URL is reachable")]
    Probe,
}

/// Arguments for the `esmos-monitor serve` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ServeCommand {
    /// Six-field cron expression (seconds first), evaluated in UTC.
    ///
    /// Overrides `ESMOS_SCHEDULE`. Defaults to every ten minutes.
    #[arg(long, value_name = "CRON")]
    pub(crate) schedule: Option<String>,
    /// Run one invocation immediately instead of waiting for the first firing.
    #[arg(long)]
    pub(crate) run_on_startup: bool,
}
