use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{TaskContext, TaskReport};
use crate::eraser;
use crate::error::TaskError;
use crate::platform::Platform;

/// Per-browser cache roots, relative to the user cache directory.
fn browser_roots(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::MacOs => &["Google/Chrome", "Firefox", "com.apple.Safari"],
        Platform::Windows => &["Google/Chrome/User Data", "Mozilla/Firefox/Profiles"],
        Platform::Linux | Platform::Other => &["google-chrome", "chromium", "mozilla/firefox"],
    }
}

/// Chrome keeps `Cache`, `Cache_Data` and `Code Cache` per profile;
/// Firefox keeps `cache2`.
fn is_cache_dir_name(name: &str) -> bool {
    name.starts_with("Cache") || name == "Code Cache" || name == "cache2"
}

pub(super) fn clean(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let cache_dir = ctx.cache_dir()?;
    let mut freed = 0;
    for root in browser_roots(ctx.platform) {
        for target in find_caches(&cache_dir.join(root)) {
            freed += eraser::erase(&target);
        }
    }
    Ok(TaskReport::freed(freed))
}

/// Collect cache entries below `root` without descending into them.
fn find_caches(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root).follow_links(false).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        if !is_cache_dir_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if entry.file_type().is_dir() {
            walker.skip_current_dir();
        }
        found.push(entry.into_path());
    }
    found
}
