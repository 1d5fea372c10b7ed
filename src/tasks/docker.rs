use super::{TaskContext, TaskReport};
use crate::error::TaskError;

/// Remove stopped containers, unused networks, dangling and unused images.
pub(super) fn clean(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let result = ctx.run_checked(ctx.command("docker").args(["system", "prune", "-af"]))?;
    // Docker ends with "Total reclaimed space: <size>".
    let summary = result.last_line();
    Ok(if summary.is_empty() {
        TaskReport::default()
    } else {
        TaskReport::noted(summary)
    })
}
