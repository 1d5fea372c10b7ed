//! Progress observers and the plain-text run summary.

use crate::orchestrator::{Ledger, Outcome, RunProgress, Status};
use crate::utils::format_size;

/// Observes a run as it happens.
///
/// `record` is called once per work unit, after its outcome is final, with
/// the progress already advanced. `finalize` is called at most once, after
/// the post-run actions.
pub trait Reporter {
    fn record(&mut self, outcome: &Outcome, progress: RunProgress);

    /// Informational line from the post-run stage.
    fn notice(&mut self, _message: &str) {}

    fn finalize(&mut self, summary: &str);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn record(&mut self, _outcome: &Outcome, _progress: RunProgress) {}

    fn finalize(&mut self, _summary: &str) {}
}

/// Multi-line summary of a run, used for the final report and notifications.
pub fn render_ledger(ledger: &Ledger, progress: RunProgress) -> String {
    let mut lines = vec![format!(
        "Cleanup finished: {}/{} units, {} succeeded, {} failed, {} freed",
        progress.completed,
        progress.total,
        ledger.succeeded(),
        ledger.failed(),
        format_size(ledger.freed_bytes())
    )];

    for outcome in ledger.outcomes() {
        lines.push(render_outcome(outcome));
    }
    lines.join("\n")
}

/// One ledger line: `[ok] Trash (1.00 KB)` or `[failed] BadTask: unknown task: BadTask`.
pub fn render_outcome(outcome: &Outcome) -> String {
    let mut line = match &outcome.status {
        Status::Success => format!(
            "[ok] {} ({})",
            outcome.unit_label,
            format_size(outcome.freed_bytes)
        ),
        Status::Failure { message, .. } => format!("[failed] {}: {message}", outcome.unit_label),
    };
    if let Some(note) = &outcome.note {
        line.push_str(&format!(" - {note}"));
    }
    line
}
