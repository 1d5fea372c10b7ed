use super::{TaskContext, TaskReport};
use crate::error::TaskError;
use crate::platform::Platform;

/// The Run dialog history.
const RUN_MRU: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Explorer\RunMRU";

pub(super) fn clean(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    if ctx.platform != Platform::Windows {
        return Ok(TaskReport::noted(format!("not supported on {}", ctx.platform)));
    }

    let result = ctx.runner.run(&ctx.command("reg").args(["delete", RUN_MRU, "/f"]))?;
    // `reg` exits 1 when the key is already gone.
    if result.success() {
        Ok(TaskReport::noted("cleared RunMRU"))
    } else {
        Ok(TaskReport::noted(format!(
            "nothing to clear: {}",
            result.last_line()
        )))
    }
}
