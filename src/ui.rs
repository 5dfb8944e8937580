use colored::{ColoredString, Colorize};
use declarative::{FieldChange, OpKind, Outcome, OutcomeStatus, Plan, Report};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plans and reports
// ============================================================================

/// Glyph for an operation kind
pub fn op_symbol(kind: OpKind) -> ColoredString {
    match kind {
        OpKind::Create => "+".green(),
        OpKind::Update => "~".yellow(),
        OpKind::Delete => "-".red(),
        OpKind::Noop => "○".dimmed(),
    }
}

fn status_symbol(status: OutcomeStatus) -> ColoredString {
    match status {
        OutcomeStatus::Applied => "✓".green(),
        OutcomeStatus::Unchanged => "○".dimmed(),
        OutcomeStatus::Failed => "✗".red(),
        OutcomeStatus::Planned => "→".cyan(),
        OutcomeStatus::Skipped => "⊘".yellow(),
    }
}

/// One rendered line of a field change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    /// `field: old → new`
    Inline(String),
    Removed(String),
    Added(String),
}

/// Render a field change.
///
/// Scalars stay on one line. Objects and lists are pretty-printed and
/// line-diffed so a one-element change in a long list stays readable.
pub fn change_lines(change: &FieldChange) -> Vec<DiffLine> {
    let structured = |v: Option<&Value>| matches!(v, Some(Value::Array(_) | Value::Object(_)));
    if change.sensitive || !(structured(change.current.as_ref()) || structured(Some(&change.desired))) {
        return vec![DiffLine::Inline(change.to_string())];
    }

    let pretty = |v: Option<&Value>| {
        v.map(|v| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()))
            .unwrap_or_default()
    };
    let current = pretty(change.current.as_ref());
    let desired = pretty(Some(&change.desired));

    let mut lines = vec![DiffLine::Inline(format!("{}:", change.field))];
    for line in TextDiff::from_lines(&current, &desired).iter_all_changes() {
        let text = line.to_string_lossy().trim_end().to_string();
        match line.tag() {
            ChangeTag::Delete => lines.push(DiffLine::Removed(text)),
            ChangeTag::Insert => lines.push(DiffLine::Added(text)),
            ChangeTag::Equal => {}
        }
    }
    lines
}

fn print_changes(changes: &[FieldChange]) {
    for change in changes {
        for line in change_lines(change) {
            match line {
                DiffLine::Inline(text) => println!("      {}", text.dimmed()),
                DiffLine::Removed(text) => println!("        {}", format!("- {text}").red()),
                DiffLine::Added(text) => println!("        {}", format!("+ {text}").green()),
            }
        }
    }
}

/// Print the operations of a plan, grouped by kind in plan order.
pub fn print_plan(plan: &Plan, show_unchanged: bool) {
    if !plan.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Plan".bold()
    );
    println!("│");
    for op in &plan.ops {
        if !op.kind.is_mutating() && !show_unchanged {
            continue;
        }
        let note = op
            .blocked_by
            .as_ref()
            .map(|b| format!(" (blocked by {b})").red().to_string())
            .unwrap_or_default();
        println!("│ {} {}{}", op_symbol(op.kind), op.identity, note);
        print_changes(&op.changes);
    }
    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ {} to create, {} to update, {} to delete",
        plan.count(OpKind::Create).to_string().green(),
        plan.count(OpKind::Update).to_string().yellow(),
        plan.count(OpKind::Delete).to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// One-line description of an outcome
pub fn outcome_line(outcome: &Outcome) -> String {
    let mut line = format!("{} {}", outcome.action, outcome.identity);
    if let Some(task) = &outcome.task_id {
        line.push_str(&format!(" [task {task}]"));
    }
    if let Some(error) = &outcome.error {
        line.push_str(&format!(": {error}"));
    }
    line
}

/// Print a finished report.
pub fn print_report(report: &Report, verbose: bool) {
    if !report.violations.is_empty() {
        header("Validation errors");
        for violation in &report.violations {
            println!("  {} {}", "✗".red(), violation);
        }
    }

    let shown: Vec<&Outcome> = report
        .response
        .iter()
        .filter(|o| verbose || o.status != OutcomeStatus::Unchanged)
        .collect();
    if !shown.is_empty() {
        println!();
        for outcome in shown {
            println!("  {} {}", status_symbol(outcome.status), outcome_line(outcome));
            if outcome.is_failed() || verbose {
                print_changes(&outcome.diff);
            }
        }
    }

    println!();
    if report.failed {
        error(&report.msg);
    } else if report.changed {
        success(&report.msg);
    } else {
        info(&report.msg);
    }
}

// ============================================================================
// Tests
// ============================================================================
