//! Post-apply verification
//!
//! Every applied op is re-read from the controller and compared again. A
//! create or update must now compare equal, a delete must be gone.

use super::Reconciler;
use super::execute::Applied;
use super::have::CurrentState;
use crate::equality::diff;
use crate::planner::{Op, Plan};
use crate::report::{OutcomeError, ReportBuilder};
use crate::types::{ErrorKind, OpKind};
use serde_json::{Map, Value};

impl Reconciler<'_> {
    pub(super) fn verify(
        &self,
        current: &mut CurrentState<'_>,
        plan: &Plan,
        applied: &[Applied],
        report: &mut ReportBuilder,
    ) {
        for entry in applied {
            let op = &plan.ops[entry.op];
            let Some(outcome) = report.outcomes_mut().get_mut(entry.position) else {
                continue;
            };

            let found = match reread(current, op) {
                Ok(found) => found,
                Err(error) => {
                    log::warn!("{}: verification read failed: {error}", op.identity);
                    *outcome = outcome.clone().with_error(error.kind, error.message);
                    continue;
                }
            };

            let mismatch = match (outcome.action, found) {
                (OpKind::Delete, Some(_)) => Some((
                    "still present after delete".to_string(),
                    Vec::new(),
                )),
                (OpKind::Delete | OpKind::Noop, None) => None,
                (action, None) => Some((format!("not found after {action}"), Vec::new())),
                (_, Some(object)) => op.desired.as_ref().and_then(|desired| {
                    let changes = diff(&op.descriptor, &object, desired);
                    (!changes.is_empty()).then(|| {
                        let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
                        (
                            format!("{} differ(s) after apply", fields.join(", ")),
                            changes,
                        )
                    })
                }),
            };

            match mismatch {
                Some((message, changes)) => {
                    log::warn!("{}: {message}", op.identity);
                    *outcome = outcome
                        .clone()
                        .with_diff(changes)
                        .with_error(ErrorKind::VerificationMismatch, message);
                }
                None => log::debug!("{} verified", op.identity),
            }
        }
    }
}

/// Fresh read of the object an op touched.
fn reread(current: &mut CurrentState<'_>, op: &Op) -> Result<Option<Map<String, Value>>, OutcomeError> {
    let descriptor = &op.descriptor;
    let mut values = op.current.clone().unwrap_or_default();
    if let Some(desired) = &op.desired {
        values.extend(desired.values.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    let objects = current.fetch(descriptor, &values)?;

    let wanted = descriptor.identity(&values);
    let id = descriptor.id_of(&values).or_else(|| op.current.as_ref().and_then(|c| descriptor.id_of(c)));
    Ok(objects.into_iter().find(|object| match &wanted {
        Some(wanted) => descriptor.identity(object).as_ref() == Some(wanted),
        None => id.is_some() && descriptor.id_of(object) == id,
    }))
}
