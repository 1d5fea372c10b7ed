use std::io;
use std::path::PathBuf;

use super::{TaskContext, TaskReport};
use crate::eraser;
use crate::error::TaskError;
use crate::platform::Platform;

fn trash_dirs(ctx: &TaskContext) -> Result<Vec<PathBuf>, TaskError> {
    let home = ctx.home()?;
    Ok(match ctx.platform {
        Platform::MacOs => vec![home.join(".Trash")],
        // Freedesktop trash keeps a `.trashinfo` per file; drop both halves.
        _ => vec![
            home.join(".local/share/Trash/files"),
            home.join(".local/share/Trash/info"),
        ],
    })
}

pub(super) fn clean(ctx: &TaskContext) -> Result<TaskReport, TaskError> {
    let mut freed = 0;
    for dir in trash_dirs(ctx)? {
        match eraser::erase_children(&dir) {
            Ok(bytes) => freed += bytes,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied && ctx.platform == Platform::MacOs => {
                return Err(TaskError::Other(
                    "Trash access denied. Grant Full Disk Access: System Settings → Privacy & Security → Full Disk Access → enable your terminal/TidySweep.".to_string(),
                ));
            }
            Err(source) => return Err(TaskError::ReadDir { path: dir, source }),
        }
    }
    Ok(TaskReport::freed(freed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;
    use crate::tasks::test_context;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn empties_freedesktop_trash() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), Platform::Linux, Arc::new(FakeRunner::ok()));
        let trash = ctx.home().unwrap().join(".local/share/Trash");
        std::fs::create_dir_all(trash.join("files/old-project")).unwrap();
        std::fs::write(trash.join("files/old-project/main.rs"), vec![b'x'; 40]).unwrap();
        std::fs::create_dir_all(trash.join("info")).unwrap();
        std::fs::write(trash.join("info/old-project.trashinfo"), vec![b'y'; 10]).unwrap();

        let report = clean(&ctx).unwrap();

        assert_eq!(report.freed_bytes, 50);
        assert_eq!(std::fs::read_dir(trash.join("files")).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(trash.join("info")).unwrap().count(), 0);
    }

    #[test]
    fn empties_macos_trash() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), Platform::MacOs, Arc::new(FakeRunner::ok()));
        let trash = ctx.home().unwrap().join(".Trash");
        std::fs::create_dir_all(&trash).unwrap();
        std::fs::write(trash.join("photo.jpg"), vec![0u8; 12]).unwrap();

        assert_eq!(clean(&ctx).unwrap().freed_bytes, 12);
    }

    #[test]
    fn missing_trash_is_success() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), Platform::Linux, Arc::new(FakeRunner::ok()));
        assert_eq!(clean(&ctx).unwrap(), TaskReport::freed(0));
    }

    #[test]
    fn no_home_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut ctx = test_context(dir.path(), Platform::Linux, Arc::new(FakeRunner::ok()));
        ctx.home = None;
        assert!(matches!(clean(&ctx), Err(TaskError::NoHome)));
    }
}
