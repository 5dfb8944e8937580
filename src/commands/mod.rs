//! Subcommand implementations

pub mod apply;
pub mod kinds;
pub mod plan;
pub mod validate;

use anyhow::{Context as _, Result};
use declarative::{
    AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ReconcileObserver, Reconciler, Registry,
    Report,
};
use dnackit::{CancelToken, Client};
use std::process::ExitCode;

use crate::Context;
use crate::cli::RunArgs;
use crate::config::Invocation;
use crate::progress::{PromptConfirm, TerminalProgress};
use crate::{resource, signals, ui};

/// The built-in registry; an error here is a bug in the descriptor table.
pub fn registry() -> Result<Registry> {
    resource::registry().context("Built-in resource table is inconsistent")
}

/// Load the invocation, connect, and reconcile.
pub fn reconcile(ctx: &Context, args: &RunArgs, dry_run: bool) -> Result<Report> {
    let mut invocation = Invocation::load(&args.file)?;
    invocation.override_with(args);
    let registry = registry()?;
    let credentials = invocation.credentials.resolve()?;

    let cancel = CancelToken::new();
    signals::install(&cancel)?;
    log::info!(
        "reconciling {} against {} (state {})",
        args.file.display(),
        credentials.host,
        invocation.state
    );
    let client = Client::new(credentials, invocation.client_options()).with_cancel(cancel);
    let reconciler = Reconciler::new(&registry, &client, invocation.reconcile_options(dry_run));

    let report = if ctx.interactive() {
        let mut progress = TerminalProgress::new(true);
        if args.yes {
            run(&reconciler, &invocation, &mut progress, &mut AutoConfirm)
        } else {
            run(&reconciler, &invocation, &mut progress, &mut PromptConfirm)
        }
    } else if args.yes || dry_run {
        run(&reconciler, &invocation, &mut NoProgress, &mut AutoConfirm)
    } else {
        log::warn!("not a terminal session and --yes not given, nothing will be applied");
        run(&reconciler, &invocation, &mut NoProgress, &mut AutoDecline)
    };
    Ok(report)
}

fn run<P: ReconcileObserver, C: ConfirmCallback>(
    reconciler: &Reconciler<'_>,
    invocation: &Invocation,
    progress: &mut P,
    confirm: &mut C,
) -> Report {
    reconciler.run(&invocation.config, progress, confirm)
}

/// Print a report the way the context asks for, and map it to an exit status.
pub fn finish(ctx: &Context, report: &Report) -> Result<ExitCode> {
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if !ctx.quiet {
        ui::print_report(report, ctx.verbose > 0);
    } else if report.failed {
        ui::error(&report.msg);
    }
    Ok(exit_code(report))
}

pub fn exit_code(report: &Report) -> ExitCode {
    if report.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
