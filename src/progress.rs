//! Terminal progress and confirmation for reconciliation runs

use colored::Colorize;
use declarative::{ConfirmCallback, Op, Outcome, OutcomeStatus, Phase, Plan, ReconcileObserver};
use dnackit::TaskHandle;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::ui;

/// Spinner for the current phase or operation
pub struct TerminalProgress {
    spinner: Option<ProgressBar>,
    total: usize,
    done: usize,
    show_plan: bool,
}

impl TerminalProgress {
    /// `show_plan` prints the plan before anything is applied.
    pub fn new(show_plan: bool) -> Self {
        Self {
            spinner: None,
            total: 0,
            done: 0,
            show_plan,
        }
    }

    fn spin(&mut self, message: String) {
        let spinner = self.spinner.get_or_insert_with(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });
        spinner.set_message(message);
    }

    fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.clear();
    }
}

impl ReconcileObserver for TerminalProgress {
    fn on_phase(&mut self, phase: Phase) {
        match phase {
            Phase::Report => self.clear(),
            Phase::Execute => {}
            other => self.spin(format!("{other}...")),
        }
    }

    fn on_plan(&mut self, plan: &Plan) {
        self.clear();
        self.total = plan.mutations().count();
        if self.show_plan {
            ui::print_plan(plan, false);
        }
    }

    fn on_op_start(&mut self, op: &Op) {
        let step = format!("[{}/{}]", self.done + 1, self.total).blue().bold();
        self.spin(format!("{step} {} {}", ui::op_symbol(op.kind), op.identity));
    }

    fn on_task(&mut self, op: &Op, handle: &TaskHandle) {
        let step = format!("[{}/{}]", self.done + 1, self.total).blue().bold();
        self.spin(format!(
            "{step} {} {} {}",
            ui::op_symbol(op.kind),
            op.identity,
            format!("waiting for task {}", handle.id).dimmed()
        ));
    }

    fn on_op_complete(&mut self, outcome: &Outcome) {
        if !outcome.action.is_mutating() {
            return;
        }
        self.done += 1;
        let line = ui::outcome_line(outcome);
        let symbol = match outcome.status {
            OutcomeStatus::Applied => "✓".green(),
            OutcomeStatus::Failed => "✗".red(),
            _ => "⊘".yellow(),
        };
        match &self.spinner {
            Some(spinner) => spinner.println(format!("  {symbol} {line}")),
            None => println!("  {symbol} {line}"),
        }
    }
}

/// Ask on the terminal before applying
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        println!();
        match dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
        {
            Ok(confirmed) => confirmed,
            Err(e) => {
                log::warn!("confirmation prompt failed: {e}");
                false
            }
        }
    }
}
