use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{erase_children_of, TaskContext, TaskReport};
use crate::eraser;
use crate::error::TaskError;
use crate::platform::Platform;

/// Downloaded `.deb` archives, system-wide and per user.
pub(super) fn clean_apt(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let dirs = [
        ctx.system_root.join("var/cache/apt/archives"),
        ctx.cache_dir()?.join("apt"),
    ];
    erase_all_children(&dirs)
}

pub(super) fn clean_pip(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let pip = ctx.cache_dir()?.join("pip");
    let dir = if ctx.platform == Platform::Windows {
        pip.join("Cache")
    } else {
        pip
    };
    erase_all_children(&[dir])
}

pub(super) fn clean_snap(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    erase_all_children(&[ctx.cache_dir()?.join("snapd")])
}

/// Every `cache` directory inside each Flatpak app's sandboxed home.
pub(super) fn clean_flatpak(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let apps = ctx.home()?.join(".var/app");
    let freed = find_named(&apps, "cache")
        .iter()
        .map(|path| eraser::erase(path))
        .sum();
    Ok(TaskReport::freed(freed))
}

fn erase_all_children(dirs: &[PathBuf]) -> Result<TaskReport, TaskError> {
    let mut freed = 0;
    for dir in dirs {
        freed += erase_children_of(dir)?;
    }
    Ok(TaskReport::freed(freed))
}

fn find_named(root: &Path, name: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root).follow_links(false).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        if entry.file_name() != name {
            continue;
        }
        if entry.file_type().is_dir() {
            walker.skip_current_dir();
        }
        found.push(entry.into_path());
    }
    found
}
