use super::{erase_children_of, TaskContext, TaskReport};
use crate::error::TaskError;

/// Empty every temp root the environment points at.
pub(super) fn clean(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let mut freed = 0;
    for dir in &ctx.temp_dirs {
        freed += erase_children_of(dir)?;
    }
    Ok(TaskReport::freed(freed))
}
