//! Observer and confirmation traits
//!
//! These traits let the reconciler report progress and ask for confirmation
//! without depending on a terminal, a UI framework or a logger.

use crate::planner::{Op, Plan};
use crate::report::Outcome;
use dnackit::TaskHandle;
use std::fmt;

/// Phase of one reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validate,
    Login,
    LoadCurrent,
    Plan,
    Execute,
    Verify,
    Report,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validating",
            Self::Login => "logging in",
            Self::LoadCurrent => "reading current state",
            Self::Plan => "planning",
            Self::Execute => "applying",
            Self::Verify => "verifying",
            Self::Report => "reporting",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress callback for a reconciliation run
///
/// Implement this trait to receive progress updates.
pub trait ReconcileObserver {
    /// Called when a phase starts
    fn on_phase(&mut self, phase: Phase);

    /// Called once the plan is known, before anything is applied
    fn on_plan(&mut self, plan: &Plan);

    /// Called when starting a mutating operation
    fn on_op_start(&mut self, op: &Op);

    /// Called when an operation returned a task handle that will be polled
    fn on_task(&mut self, op: &Op, handle: &TaskHandle);

    /// Called when an operation has an outcome
    fn on_op_complete(&mut self, outcome: &Outcome);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the user to confirm applying a plan
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// No-op observer
pub struct NoProgress;

impl ReconcileObserver for NoProgress {
    fn on_phase(&mut self, _phase: Phase) {}
    fn on_plan(&mut self, _plan: &Plan) {}
    fn on_op_start(&mut self, _op: &Op) {}
    fn on_task(&mut self, _op: &Op, _handle: &TaskHandle) {}
    fn on_op_complete(&mut self, _outcome: &Outcome) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> bool {
        false
    }
}
