//! Best-effort path removal.
//!
//! `erase` never reports failure to its caller: a missing path and a path
//! that could not be removed look the same (both free whatever they free).
//! `try_erase` is the strict variant used when the configuration asks for
//! removal errors to reach the ledger.

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::TaskError;
use crate::utils;

/// Remove a directory tree or a single file. Returns the bytes freed.
///
/// Directories are removed contents-first and symlinks are never followed.
/// Entry-level errors are skipped so as much as possible goes.
pub fn erase(path: &Path) -> u64 {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "cannot stat, skipping");
            }
            return 0;
        }
    };

    let before = utils::entry_size(path);
    if meta.is_dir() {
        let failures = remove_tree(path);
        if failures > 0 {
            debug!(path = %path.display(), failures, "some entries were left behind");
        }
    } else if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "file not removed");
        }
    }
    before.saturating_sub(utils::entry_size(path))
}

/// Strict removal: "already absent" is still success, anything else is an error.
pub fn try_erase(path: &Path) -> io::Result<u64> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let size = utils::entry_size(path);
    let removed = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(size),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Erase every entry inside `dir`, keeping `dir` itself.
///
/// A missing directory frees nothing. Failing to list an existing directory
/// is an error; failures on the entries are not.
pub fn erase_children(dir: &Path) -> io::Result<u64> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    Ok(read_dir.flatten().map(|entry| erase(&entry.path())).sum())
}

/// Turn a user-supplied custom path into something safe to erase.
///
/// `.` and `..` are folded before the root and home checks, and an existing
/// parent is resolved through symlinks so neither can be reached indirectly.
pub fn resolve_target(raw: &str, home: Option<&Path>) -> Result<PathBuf, TaskError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TaskError::Refused {
            path: raw.to_string(),
            reason: "empty path",
        });
    }

    let path = normalize(&utils::expand_tilde(trimmed, home));
    if path.as_os_str().is_empty() {
        return Err(TaskError::Refused {
            path: trimmed.to_string(),
            reason: "working directory",
        });
    }
    let real = real_location(&path);
    if path.parent().is_none() || real.parent().is_none() {
        return Err(TaskError::Refused {
            path: path.display().to_string(),
            reason: "filesystem root",
        });
    }
    if let Some(home) = home {
        let home = normalize(home);
        let real_home = std::fs::canonicalize(&home).unwrap_or_else(|_| home.clone());
        if path == home || real == real_home {
            return Err(TaskError::Refused {
                path: path.display().to_string(),
                reason: "home directory",
            });
        }
    }
    Ok(path)
}

/// Lexically drop `.` and fold `..` into the component before it.
/// `..` at the root stays at the root; leading `..` of a relative path is kept.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Where `path` itself lives once its parent's symlinks are resolved.
/// The final component is left alone since erasing never follows it.
fn real_location(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match std::fs::canonicalize(parent) {
            Ok(parent) => parent.join(name),
            Err(_) => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

fn remove_tree(path: &Path) -> usize {
    let mut failures = 0;
    for entry in WalkDir::new(path).follow_links(false).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "walk error");
                failures += 1;
                continue;
            }
        };

        let removed = if entry.file_type().is_dir() {
            std::fs::remove_dir(entry.path())
        } else {
            std::fs::remove_file(entry.path())
        };
        if let Err(e) = removed {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(path = %entry.path().display(), error = %e, "entry not removed");
                failures += 1;
            }
        }
    }
    failures
}
