use super::{TaskContext, TaskReport};
use crate::error::TaskError;
use crate::platform::Platform;

/// One tool per filesystem family; whichever matches the root filesystem wins.
const LINUX_TOOLS: &[&[&str]] = &[
    &["e4defrag", "/"],
    &["xfs_fsr", "-v", "/"],
    &["btrfs", "filesystem", "defragment", "-r", "/"],
];

pub(super) fn clean(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    match ctx.platform {
        Platform::Windows => {
            ctx.run_checked(ctx.command("defrag").args(["C:", "/U", "/V"]))?;
            Ok(TaskReport::noted("defragmented C:"))
        }
        Platform::Linux => defrag_linux(ctx),
        other => Ok(TaskReport::noted(format!("not supported on {other}"))),
    }
}

fn defrag_linux(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let mut succeeded = Vec::new();
    let mut failures = Vec::new();

    for tool in LINUX_TOOLS {
        let spec = ctx.command("sudo").arg("-n").args(tool.iter().copied());
        match ctx.run_checked(spec) {
            Ok(_) => succeeded.push(tool[0]),
            Err(e) if e.is_timeout() => return Err(e),
            Err(e) => failures.push(format!("{}: {e}", tool[0])),
        }
    }

    if succeeded.is_empty() {
        Err(TaskError::Other(format!(
            "no defragmentation tool succeeded ({})",
            failures.join("; ")
        )))
    } else {
        Ok(TaskReport::noted(format!(
            "defragmented with {}",
            succeeded.join(", ")
        )))
    }
}
