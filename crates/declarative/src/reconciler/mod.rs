//! Reconciliation state machine
//!
//! One [`Reconciler::run`] drives a document through
//! validate → login → load current → plan → execute → verify → report.
//! Any phase can end the run early; the result is always a [`Report`].
//! Invocation-level failures (invalid input, failed login, a dependency
//! cycle) stop before the first mutating call.

mod execute;
mod have;
mod verify;


pub use have::{CurrentState, LookupFailure};

use crate::context::{ConfirmCallback, Phase, ReconcileObserver};
use crate::descriptor::{Identity, Registry};
use crate::document::validate_document;
use crate::planner::{self, Assessment, Plan, PlanInput, Undeclared};
use crate::report::{Outcome, OutcomeError, OutcomeStatus, Report, ReportBuilder};
use crate::schema::NormalizedItem;
use crate::types::{ErrorKind, OpKind, State};
use dnackit::{Client, PollPolicy};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Options for one invocation
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub state: State,
    /// Re-read every changed object after applying and compare again
    pub verify: bool,
    /// Task deadline and poll interval
    pub poll: PollPolicy,
    /// Plan only; make no mutating call
    pub dry_run: bool,
}

/// Drives one desired-state document against one controller
pub struct Reconciler<'a> {
    registry: &'a Registry,
    client: &'a Client,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a Registry, client: &'a Client, options: ReconcileOptions) -> Self {
        Self {
            registry,
            client,
            options,
        }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile `config` and report what happened.
    ///
    /// # Arguments
    /// * `config` - The desired-state document (a list of items)
    /// * `progress` - Progress observer
    /// * `confirm` - Asked once before the first mutating call
    pub fn run<P, C>(&self, config: &Value, progress: &mut P, confirm: &mut C) -> Report
    where
        P: ReconcileObserver,
        C: ConfirmCallback,
    {
        let mut report = ReportBuilder::new(self.options.dry_run);
        self.reconcile(config, &mut report, progress, confirm);
        progress.on_phase(Phase::Report);
        let report = report.build();
        if report.failed {
            log::warn!("{}", report.msg);
        } else {
            log::info!("{}", report.msg);
        }
        report
    }

    fn reconcile<P, C>(
        &self,
        config: &Value,
        report: &mut ReportBuilder,
        progress: &mut P,
        confirm: &mut C,
    ) where
        P: ReconcileObserver,
        C: ConfirmCallback,
    {
        progress.on_phase(Phase::Validate);
        let items = match validate_document(self.registry, config, self.options.state) {
            Ok(items) => items,
            Err(violations) => {
                report.invalid(violations);
                return;
            }
        };
        log::info!(
            "{} item(s) validated, state {}",
            items.len(),
            self.options.state
        );

        progress.on_phase(Phase::Login);
        if let Err(e) = self.client.login() {
            report.abort(ErrorKind::from_api(&e), format!("login failed: {e}"));
            return;
        }

        progress.on_phase(Phase::LoadCurrent);
        let mut current = CurrentState::new(self.client);
        let input = match self.assess(&mut current, items, report) {
            Ok(input) => input,
            Err(error) => {
                report.abort(error.kind, error.message);
                return;
            }
        };

        progress.on_phase(Phase::Plan);
        let failed = input.failed.clone();
        let plan = match planner::plan(input) {
            Ok(plan) => plan,
            Err(cycle) => {
                report.abort(ErrorKind::DependencyCycle, cycle.to_string());
                return;
            }
        };
        progress.on_plan(&plan);

        if self.options.dry_run {
            for op in &plan.ops {
                let status = if op.kind.is_mutating() {
                    OutcomeStatus::Planned
                } else {
                    OutcomeStatus::Unchanged
                };
                report.push(
                    Outcome::new(op.identity.clone(), op.kind, status).with_diff(op.changes.clone()),
                );
            }
            return;
        }

        if plan.has_changes() && !confirm.confirm(&prompt(&plan)) {
            log::info!("plan declined, nothing applied");
            for op in &plan.ops {
                let status = if op.kind.is_mutating() {
                    OutcomeStatus::Skipped
                } else {
                    OutcomeStatus::Unchanged
                };
                report.push(
                    Outcome::new(op.identity.clone(), op.kind, status).with_diff(op.changes.clone()),
                );
            }
            return;
        }

        progress.on_phase(Phase::Execute);
        let applied = self.execute(&plan, failed, report, progress);

        if self.options.verify && !applied.is_empty() {
            progress.on_phase(Phase::Verify);
            current.clear();
            self.verify(&mut current, &plan, &applied, report);
        }
    }

    /// Look every declared item up and collect the planner input.
    ///
    /// Items that cannot be looked up become failed outcomes right away. A
    /// fatal lookup failure ends the run.
    fn assess(
        &self,
        current: &mut CurrentState<'_>,
        items: Vec<NormalizedItem>,
        report: &mut ReportBuilder,
    ) -> Result<PlanInput, OutcomeError> {
        let state = self.options.state;
        let mut input = PlanInput {
            state,
            ..PlanInput::default()
        };
        // identity -> document index of the item that claimed it
        let mut claimed: BTreeMap<Identity, usize> = BTreeMap::new();

        for item in items {
            let Some(descriptor) = self.registry.get(&item.kind) else {
                continue;
            };
            let Some(identity) = descriptor.item_identity(&item.values) else {
                continue;
            };
            match current.lookup(descriptor, &item, state) {
                Ok(found) => {
                    // an item named by id alone is reported under its name once known
                    let identity = found
                        .as_ref()
                        .and_then(|c| descriptor.identity(c))
                        .filter(|_| descriptor.identity(&item.values).is_none())
                        .unwrap_or(identity);
                    if let Some(&first) = claimed.get(&identity) {
                        let message = format!(
                            "config[{}] resolves to {identity}, which config[{first}] already declares",
                            item.index
                        );
                        log::warn!("{message}");
                        report.push(Outcome::failed(
                            identity,
                            intended(state),
                            ErrorKind::InvalidInput,
                            message,
                        ));
                        continue;
                    }
                    claimed.insert(identity.clone(), item.index);
                    input.items.push(Assessment {
                        item,
                        identity,
                        descriptor: Arc::clone(descriptor),
                        current: found,
                    });
                }
                Err(failure) if failure.fatal => return Err(failure.error),
                Err(failure) => {
                    log::warn!("{identity}: {}", failure.error);
                    input.failed.insert(identity.clone());
                    report.push(Outcome::failed(
                        identity,
                        intended(state),
                        failure.error.kind,
                        failure.error.message,
                    ));
                }
            }
        }

        if state == State::Replaced {
            input.undeclared = self.undeclared(current, &input.items)?;
        }
        Ok(input)
    }

    /// Undeclared objects in scope, for every kind the document declares.
    fn undeclared(
        &self,
        current: &mut CurrentState<'_>,
        assessed: &[Assessment],
    ) -> Result<Vec<Undeclared>, OutcomeError> {
        let mut out = Vec::new();
        for descriptor in self.registry.iter() {
            let declared: Vec<&NormalizedItem> = assessed
                .iter()
                .filter(|a| a.descriptor.kind == descriptor.kind)
                .map(|a| &a.item)
                .collect();
            if declared.is_empty() {
                continue;
            }
            for (identity, object) in current.undeclared(descriptor, &declared)? {
                log::info!("{identity} is not declared, it will be deleted");
                out.push(Undeclared {
                    identity,
                    descriptor: Arc::clone(descriptor),
                    current: object,
                });
            }
        }
        Ok(out)
    }
}

/// Action an item would have had, for items that fail before planning.
fn intended(state: State) -> OpKind {
    match state {
        State::Deleted => OpKind::Delete,
        State::Merged | State::Replaced => OpKind::Update,
    }
}

fn prompt(plan: &Plan) -> String {
    format!(
        "Apply {} create(s), {} update(s) and {} delete(s)?",
        plan.count(OpKind::Create),
        plan.count(OpKind::Update),
        plan.count(OpKind::Delete)
    )
}
