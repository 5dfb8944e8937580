//! `ccwm plan`: everything up to the plan, nothing mutating

use anyhow::Result;
use std::process::ExitCode;

use crate::Context;
use crate::cli::RunArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &RunArgs) -> Result<ExitCode> {
    let report = super::reconcile(ctx, args, true)?;
    if ctx.interactive() && !report.failed {
        ui::dim("Dry run - no changes made");
    }
    super::finish(ctx, &report)
}
