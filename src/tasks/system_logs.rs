use super::{TaskContext, TaskReport};
use crate::error::TaskError;

/// Keep one week of journal.
const RETENTION: &str = "--vacuum-time=7d";

pub(super) fn clean(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let result = ctx.run_checked(ctx.command("journalctl").arg(RETENTION))?;
    let summary = result.last_line();
    Ok(if summary.is_empty() {
        TaskReport::default()
    } else {
        TaskReport::noted(summary)
    })
}
