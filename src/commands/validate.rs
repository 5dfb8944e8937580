//! `ccwm validate`: schema validation only, no API calls

use anyhow::Result;
use declarative::report::ReportBuilder;
use declarative::{NormalizedItem, Registry, Report, State, validate_document};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;

use crate::Context;
use crate::cli::StateArg;
use crate::config::Invocation;
use crate::ui;

pub fn run(ctx: &Context, file: &Path, state: Option<StateArg>) -> Result<ExitCode> {
    let invocation = Invocation::load(file)?;
    let state = state.map_or(invocation.state, Into::into);
    let registry = super::registry()?;

    match check(&registry, &invocation.config, state) {
        Ok(items) => {
            if ctx.json {
                let report = ReportBuilder::new(false).build();
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !ctx.quiet {
                ui::success(&format!("{} item(s) valid for state {state}", items.len()));
                for (kind, count) in count_by_kind(&items) {
                    ui::kv(&kind, &count.to_string());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(report) => super::finish(ctx, &report),
    }
}

/// Validate a document; violations come back as a failed report.
pub fn check(registry: &Registry, config: &Value, state: State) -> Result<Vec<NormalizedItem>, Report> {
    validate_document(registry, config, state).map_err(|violations| {
        let mut report = ReportBuilder::new(false);
        report.invalid(violations);
        report.build()
    })
}

fn count_by_kind(items: &[NormalizedItem]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(item.kind.clone()).or_insert(0) += 1;
    }
    counts
}
