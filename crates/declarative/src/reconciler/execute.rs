//! Operation execution
//!
//! Ops run one at a time in plan order. A failure is recorded against its
//! op and the loop goes on, except that dependents of a failed op fail with
//! `DependencyFailed`, and a failed plan-fatal op stops everything after it.

use super::Reconciler;
use super::have::{CurrentState, api_error};
use crate::context::ReconcileObserver;
use crate::descriptor::{Delivery, Endpoint, Identity, render_path, render_query};
use crate::planner::{Op, Plan};
use crate::report::{Outcome, OutcomeError, OutcomeStatus, ReportBuilder};
use crate::types::{ErrorKind, OpKind, State};
use dnackit::{ApiResponse, ErrorCategory, Method, TerminalStatus};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// An op that reached the controller, and where its outcome is in the report
pub(super) struct Applied {
    pub position: usize,
    pub op: usize,
}

/// What one op did on success
struct Done {
    action: OpKind,
    task_id: Option<String>,
}

impl Reconciler<'_> {
    /// Run every op of the plan; returns the ops that were applied.
    pub(super) fn execute<P: ReconcileObserver>(
        &self,
        plan: &Plan,
        mut failed: BTreeSet<Identity>,
        report: &mut ReportBuilder,
        progress: &mut P,
    ) -> Vec<Applied> {
        let cancel = self.client.cancel_token();
        let mut applied = Vec::new();
        let mut aborted: Option<Identity> = None;

        for (index, op) in plan.ops.iter().enumerate() {
            if !op.kind.is_mutating() {
                let outcome = Outcome::new(op.identity.clone(), op.kind, OutcomeStatus::Unchanged);
                progress.on_op_complete(&outcome);
                report.push(outcome);
                continue;
            }

            let skip = if let Some(fatal) = &aborted {
                Some(OutcomeError::new(
                    ErrorKind::PlanAborted,
                    format!("not attempted: {fatal} failed"),
                ))
            } else if cancel.is_cancelled() {
                Some(OutcomeError::new(ErrorKind::Cancelled, "not attempted: cancelled"))
            } else if let Some(blocker) = &op.blocked_by {
                Some(OutcomeError::new(
                    ErrorKind::DependencyFailed,
                    format!("depends on {blocker}, which failed or is being deleted"),
                ))
            } else {
                op.requires.iter().find(|r| failed.contains(*r)).map(|r| {
                    OutcomeError::new(ErrorKind::DependencyFailed, format!("depends on {r}, which failed"))
                })
            };

            let outcome = if let Some(error) = skip {
                log::warn!("{} {}: {error}", op.kind, op.identity);
                let mut outcome = Outcome::new(op.identity.clone(), op.kind, OutcomeStatus::Failed);
                if error.kind == ErrorKind::PlanAborted {
                    outcome.status = OutcomeStatus::Skipped;
                }
                outcome.error = Some(error);
                outcome
            } else {
                progress.on_op_start(op);
                match self.apply(op, progress) {
                    Ok(done) => {
                        log::info!("{} {} applied", done.action, op.identity);
                        applied.push(Applied {
                            position: report.outcomes().len(),
                            op: index,
                        });
                        let outcome =
                            Outcome::new(op.identity.clone(), done.action, OutcomeStatus::Applied)
                                .with_diff(op.changes.clone());
                        match done.task_id {
                            Some(id) => outcome.with_task(id),
                            None => outcome,
                        }
                    }
                    Err(error) => {
                        log::warn!("{} {} failed: {error}", op.kind, op.identity);
                        if op.descriptor.plan_fatal {
                            aborted = Some(op.identity.clone());
                        }
                        Outcome::new(op.identity.clone(), op.kind, OutcomeStatus::Failed)
                            .with_diff(op.changes.clone())
                            .with_error(error.kind, error.message)
                    }
                }
            };

            if outcome.is_failed() || outcome.status == OutcomeStatus::Skipped {
                failed.insert(op.identity.clone());
            }
            progress.on_op_complete(&outcome);
            report.push(outcome);
        }
        applied
    }

    fn apply<P: ReconcileObserver>(&self, op: &Op, progress: &mut P) -> Result<Done, OutcomeError> {
        let descriptor = &op.descriptor;
        match self.call(op, op.kind, &op.payload, progress) {
            Err(error)
                if op.kind == OpKind::Update
                    && error.kind == ErrorKind::NotFound
                    && self.options.state != State::Deleted
                    && descriptor.promote_missing_to_create =>
            {
                let Some(desired) = &op.desired else {
                    return Err(error);
                };
                log::info!("{} vanished before its update, creating it", op.identity);
                let payload = descriptor.payload(OpKind::Create, desired, None);
                self.call(op, OpKind::Create, &payload, progress)
            }
            other => other,
        }
    }

    /// Send one mutating request and wait for its task.
    fn call<P: ReconcileObserver>(
        &self,
        op: &Op,
        action: OpKind,
        payload: &Map<String, Value>,
        progress: &mut P,
    ) -> Result<Done, OutcomeError> {
        let descriptor = &op.descriptor;
        let endpoint = match action {
            OpKind::Create => descriptor.create.as_ref(),
            OpKind::Update => descriptor.update.as_ref(),
            OpKind::Delete => descriptor.delete.as_ref(),
            OpKind::Noop => None,
        }
        .ok_or_else(|| {
            OutcomeError::new(
                ErrorKind::InvalidInput,
                format!("kind '{}' does not support {action}", descriptor.kind),
            )
        })?;

        let mut values = op.template_values();
        values.extend(payload.iter().map(|(k, v)| (k.clone(), v.clone())));
        let path = render_path(&endpoint.path, &values)
            .map_err(|e| OutcomeError::new(ErrorKind::InvalidInput, e.to_string()))?;
        let query = render_query(&endpoint.query, &values);
        let body = descriptor.request_body(endpoint, payload);
        log::debug!("{} {path}", endpoint.method);

        let response = match (action, body) {
            (OpKind::Create, Some(body)) if endpoint.method == Method::Post => {
                self.client.create_guarded(&path, &query, body, || {
                    CurrentState::probe(self.client, descriptor, &values)
                })
            }
            (_, body) => self.client.submit(endpoint.method, &path, &query, body),
        }
        .map_err(|e| api_error(&format!("{} {path}", endpoint.method), &e))?;

        let handle = match response {
            ApiResponse::Task(handle) if endpoint.delivery == Delivery::Task => handle,
            ApiResponse::Task(handle) => {
                log::debug!("{} returned task {} but answers inline, not polling", endpoint.path, handle.id);
                return Ok(Done { action, task_id: None });
            }
            ApiResponse::Inline(_) => return Ok(Done { action, task_id: None }),
        };

        progress.on_task(op, &handle);
        let status = self
            .client
            .await_task(&handle, &self.policy(endpoint))
            .map_err(|e| match e.category() {
                ErrorCategory::Cancelled => OutcomeError::new(
                    ErrorKind::Cancelled,
                    format!("task {} was still running when cancelled", handle.id),
                ),
                _ => api_error(&format!("polling task {}", handle.id), &e),
            })?;

        match status {
            TerminalStatus::Success(_) => Ok(Done {
                action,
                task_id: Some(handle.id),
            }),
            TerminalStatus::Failure { reason, .. } => Err(OutcomeError::new(
                ErrorKind::UpstreamFailure,
                format!("task {} failed: {reason}", handle.id),
            )),
            TerminalStatus::DeadlineExceeded { elapsed } => Err(OutcomeError::new(
                ErrorKind::DeadlineExceeded,
                format!(
                    "task {} did not finish within {:?} (waited {:.1}s)",
                    handle.id,
                    self.options.poll.timeout,
                    elapsed.as_secs_f64()
                ),
            )),
            TerminalStatus::Cancelled => Err(OutcomeError::new(
                ErrorKind::Cancelled,
                format!("task {} was still running when cancelled", handle.id),
            )),
        }
    }

    fn policy(&self, endpoint: &Endpoint) -> dnackit::PollPolicy {
        match &endpoint.success_pattern {
            Some(pattern) => self.options.poll.clone().with_success_pattern(pattern.clone()),
            None => self.options.poll.clone(),
        }
    }
}
