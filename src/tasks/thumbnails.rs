use super::{erase_children_of, TaskContext, TaskReport};
use crate::error::TaskError;

pub(super) fn clean(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let freed = erase_children_of(&ctx.cache_dir()?.join("thumbnails"))?;
    Ok(TaskReport::freed(freed))
}
