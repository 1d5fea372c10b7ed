use super::{TaskContext, TaskReport};
use crate::error::TaskError;

/// Remove packages that were pulled in as dependencies and are no longer needed.
///
/// `sudo -n` never prompts: an unattended run fails instead of hanging.
pub(super) fn clean(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let result = ctx.run_checked(ctx.command("sudo").args(["-n", "apt", "autoremove", "-y"]))?;
    let removed = result
        .stdout
        .lines()
        .find(|line| line.contains("upgraded,") && line.contains("to remove"))
        .map(|line| line.trim().to_string());
    Ok(removed.map(TaskReport::noted).unwrap_or_default())
}
