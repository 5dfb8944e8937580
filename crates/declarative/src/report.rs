//! Result aggregation
//!
//! Every declared item ends up as exactly one [`Outcome`]. A [`Report`]
//! aggregates them into the invocation result: `changed`, `failed`, a one
//! line `msg`, and the structured detail.

use crate::descriptor::Identity;
use crate::equality::FieldChange;
use crate::schema::Violation;
use crate::types::{ErrorKind, OpKind};
use serde::Serialize;
use std::fmt;

/// What happened to one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Nothing to do
    Unchanged,
    /// The controller confirmed the change
    Applied,
    Failed,
    /// Would run; dry runs only
    Planned,
    /// Not attempted (declined)
    Skipped,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Planned => "planned",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OutcomeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub identity: Identity,
    pub action: OpKind,
    pub status: OutcomeStatus,
    /// Field changes (for a mismatch: observed vs desired)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diff: Vec<FieldChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Outcome {
    pub fn new(identity: Identity, action: OpKind, status: OutcomeStatus) -> Self {
        Self {
            identity,
            action,
            status,
            diff: Vec::new(),
            error: None,
            task_id: None,
        }
    }

    /// A failed outcome.
    pub fn failed(identity: Identity, action: OpKind, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(identity, action, OutcomeStatus::Failed).with_error(kind, message)
    }

    pub fn with_diff(mut self, diff: Vec<FieldChange>) -> Self {
        self.diff = diff;
        self
    }

    /// Attach an error; the outcome becomes failed.
    pub fn with_error(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.status = OutcomeStatus::Failed;
        self.error = Some(OutcomeError::new(kind, message));
        self
    }

    pub fn with_task(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }

    /// Error kind, if failed
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Whether the controller was changed by this operation
    pub fn changed_controller(&self) -> bool {
        self.status == OutcomeStatus::Applied
            || self.error_kind() == Some(ErrorKind::VerificationMismatch)
    }
}

/// Field changes of one item, for the report's `diff`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDiff {
    pub identity: Identity,
    pub action: OpKind,
    pub changes: Vec<FieldChange>,
}

/// Counts over a set of outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
    pub planned: usize,
}

impl Summary {
    /// Add an outcome to the summary
    pub fn add(&mut self, outcome: &Outcome) {
        match (outcome.status, outcome.action) {
            (OutcomeStatus::Failed, _) => self.failed += 1,
            (OutcomeStatus::Skipped, _) => self.skipped += 1,
            (OutcomeStatus::Unchanged | OutcomeStatus::Planned | OutcomeStatus::Applied, OpKind::Noop)
            | (OutcomeStatus::Unchanged, _) => self.unchanged += 1,
            (OutcomeStatus::Planned, _) => self.planned += 1,
            (OutcomeStatus::Applied, OpKind::Create) => self.created += 1,
            (OutcomeStatus::Applied, OpKind::Update) => self.updated += 1,
            (OutcomeStatus::Applied, OpKind::Delete) => self.deleted += 1,
        }
    }

    /// Total number of changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Result of one invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub changed: bool,
    pub failed: bool,
    pub msg: String,
    /// One outcome per operation, in execution order
    pub response: Vec<Outcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diff: Vec<ItemDiff>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
    /// Invocation-level failure that stopped the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl Report {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for outcome in &self.response {
            summary.add(outcome);
        }
        summary
    }

    /// Outcome for an identity
    pub fn outcome(&self, identity: &Identity) -> Option<&Outcome> {
        self.response.iter().find(|o| &o.identity == identity)
    }

    /// Failed outcomes, in order
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.response.iter().filter(|o| o.is_failed())
    }
}

/// Collects outcomes into a [`Report`]
#[derive(Debug, Default)]
pub struct ReportBuilder {
    dry_run: bool,
    outcomes: Vec<Outcome>,
    violations: Vec<Violation>,
    error: Option<OutcomeError>,
}

impl ReportBuilder {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn push(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn outcomes_mut(&mut self) -> &mut [Outcome] {
        &mut self.outcomes
    }

    /// Record schema violations; the run stops before any API call.
    pub fn invalid(&mut self, violations: Vec<Violation>) {
        let details: Vec<String> = violations.iter().map(ToString::to_string).collect();
        self.error = Some(OutcomeError::new(
            ErrorKind::InvalidInput,
            format!(
                "{} validation error(s): {}",
                violations.len(),
                details.join("; ")
            ),
        ));
        self.violations = violations;
    }

    /// Record an invocation-level failure.
    pub fn abort(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.error = Some(OutcomeError::new(kind, message));
    }

    pub fn build(self) -> Report {
        let mut summary = Summary::default();
        for outcome in &self.outcomes {
            summary.add(outcome);
        }

        let changed = self.outcomes.iter().any(|o| {
            o.changed_controller()
                || (self.dry_run && o.status == OutcomeStatus::Planned && o.action.is_mutating())
        });
        let failed = self.error.is_some() || summary.failed > 0;

        let diff = self
            .outcomes
            .iter()
            .filter(|o| !o.diff.is_empty())
            .map(|o| ItemDiff {
                identity: o.identity.clone(),
                action: o.action,
                changes: o.diff.clone(),
            })
            .collect();

        let msg = message(&summary, &self.outcomes, self.error.as_ref(), self.dry_run);
        Report {
            changed,
            failed,
            msg,
            response: self.outcomes,
            diff,
            violations: self.violations,
            error: self.error,
        }
    }
}

fn message(
    summary: &Summary,
    outcomes: &[Outcome],
    error: Option<&OutcomeError>,
    dry_run: bool,
) -> String {
    let mut parts = Vec::new();
    if dry_run {
        for kind in [OpKind::Create, OpKind::Update, OpKind::Delete] {
            let n = outcomes
                .iter()
                .filter(|o| o.status == OutcomeStatus::Planned && o.action == kind)
                .count();
            if n > 0 {
                parts.push(format!("{n} to {kind}"));
            }
        }
    }
    let counts = [
        (summary.created, "created"),
        (summary.updated, "updated"),
        (summary.deleted, "deleted"),
        (summary.unchanged, "unchanged"),
        (summary.skipped, "skipped"),
        (summary.failed, "failed"),
    ];
    parts.extend(
        counts
            .iter()
            .filter(|(n, _)| *n > 0)
            .map(|(n, label)| format!("{n} {label}")),
    );

    let counts = if parts.is_empty() {
        "nothing to do".to_string()
    } else {
        parts.join(", ")
    };
    match error {
        Some(error) if outcomes.is_empty() => error.to_string(),
        Some(error) => format!("{error} ({counts})"),
        None => counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ViolationKind;
    use serde_json::json;

    fn id(name: &str) -> Identity {
        Identity::new("ssid", vec![("name".to_string(), name.to_string())])
    }

    #[test]
    fn test_counts_and_message() {
        let mut builder = ReportBuilder::new(false);
        builder.push(Outcome::new(id("a"), OpKind::Create, OutcomeStatus::Applied));
        builder.push(Outcome::new(id("b"), OpKind::Noop, OutcomeStatus::Unchanged));
        builder.push(Outcome::failed(
            id("c"),
            OpKind::Update,
            ErrorKind::DeadlineExceeded,
            "task t-1 did not finish within 1s",
        ));
        let report = builder.build();
        assert!(report.changed);
        assert!(report.failed);
        assert_eq!(report.msg, "1 created, 1 unchanged, 1 failed");
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_unchanged_run() {
        let mut builder = ReportBuilder::new(false);
        builder.push(Outcome::new(id("a"), OpKind::Noop, OutcomeStatus::Unchanged));
        let report = builder.build();
        assert!(!report.changed);
        assert!(!report.failed);
        assert_eq!(report.msg, "1 unchanged");
    }

    #[test]
    fn test_verification_mismatch_counts_as_changed() {
        let mut builder = ReportBuilder::new(false);
        builder.push(Outcome::failed(
            id("a"),
            OpKind::Update,
            ErrorKind::VerificationMismatch,
            "band differs after apply",
        ));
        let report = builder.build();
        assert!(report.changed);
        assert!(report.failed);
    }

    #[test]
    fn test_dry_run() {
        let mut builder = ReportBuilder::new(true);
        builder.push(Outcome::new(id("a"), OpKind::Create, OutcomeStatus::Planned));
        builder.push(Outcome::new(id("b"), OpKind::Noop, OutcomeStatus::Planned));
        let report = builder.build();
        assert!(report.changed);
        assert_eq!(report.msg, "1 to create, 1 unchanged");
    }

    #[test]
    fn test_invalid_input_lists_every_violation() {
        let mut builder = ReportBuilder::new(false);
        builder.invalid(vec![
            Violation::new("config[0].name", ViolationKind::Missing),
            Violation::new("config[1]", ViolationKind::MissingKind),
        ]);
        let report = builder.build();
        assert!(report.failed);
        assert!(!report.changed);
        assert!(report.response.is_empty());
        assert_eq!(
            report.msg,
            "InvalidInput: 2 validation error(s): config[0].name: required field is missing; config[1]: item has no 'kind'"
        );
    }

    #[test]
    fn test_serialized_shape() {
        let mut builder = ReportBuilder::new(false);
        builder.push(
            Outcome::new(id("a"), OpKind::Update, OutcomeStatus::Applied)
                .with_diff(vec![FieldChange {
                    field: "band".to_string(),
                    current: Some(json!("5G")),
                    desired: json!("6G"),
                    sensitive: false,
                }])
                .with_task("t-1"),
        );
        let value = serde_json::to_value(builder.build()).unwrap();
        assert_eq!(value["changed"], true);
        assert_eq!(value["response"][0]["identity"], "ssid[name=a]");
        assert_eq!(value["response"][0]["status"], "applied");
        assert_eq!(value["response"][0]["task_id"], "t-1");
        assert_eq!(value["diff"][0]["changes"][0]["desired"], "6G");
        assert!(value.get("violations").is_none());
    }
}
