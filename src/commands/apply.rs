//! `ccwm apply`: full reconciliation

use anyhow::Result;
use std::process::ExitCode;

use crate::Context;
use crate::cli::RunArgs;

pub fn run(ctx: &Context, args: &RunArgs) -> Result<ExitCode> {
    let report = super::reconcile(ctx, args, false)?;
    super::finish(ctx, &report)
}
