mod autoremove;
mod browser_caches;
mod defrag;
mod docker;
mod package_caches;
mod registry_clean;
mod system_logs;
mod temp_files;
mod thumbnails;
mod trash;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RegistryError, TaskError};
use crate::platform::Platform;
use crate::runner::{CommandResult, CommandRunner, CommandSpec};

/// What a task reports back when it finishes without error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub freed_bytes: u64,
    pub note: Option<String>,
}

impl TaskReport {
    pub fn freed(bytes: u64) -> Self {
        Self {
            freed_bytes: bytes,
            note: None,
        }
    }

    pub fn noted(note: impl Into<String>) -> Self {
        Self {
            freed_bytes: 0,
            note: Some(note.into()),
        }
    }
}

pub type Operation = fn(&TaskContext) -> Result<TaskReport, TaskError>;

/// One entry of the task catalogue.
#[derive(Clone, Copy)]
pub struct Task {
    /// Human-readable label; the key callers select by.
    pub name: &'static str,
    /// Kebab-case alias accepted on the command line.
    pub slug: &'static str,
    pub applicable: fn(Platform) -> bool,
    pub operation: Operation,
}

impl Task {
    pub fn applicable_on(&self, platform: Platform) -> bool {
        (self.applicable)(platform)
    }
}

/// The built-in cleanup tasks, in catalogue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskId {
    TempFiles,
    BrowserCache,
    Trash,
    SystemLogs,
    AptCache,
    PipCache,
    ThumbnailCache,
    DockerPrune,
    FlatpakCache,
    SnapCache,
    AutoremovePackages,
    Defragmentation,
    RegistryClean,
}

impl TaskId {
    pub const ALL: [TaskId; 13] = [
        TaskId::TempFiles,
        TaskId::BrowserCache,
        TaskId::Trash,
        TaskId::SystemLogs,
        TaskId::AptCache,
        TaskId::PipCache,
        TaskId::ThumbnailCache,
        TaskId::DockerPrune,
        TaskId::FlatpakCache,
        TaskId::SnapCache,
        TaskId::AutoremovePackages,
        TaskId::Defragmentation,
        TaskId::RegistryClean,
    ];

    pub fn task(self) -> Task {
        match self {
            TaskId::TempFiles => entry("Temp files", "temp-files", everywhere, temp_files::clean),
            TaskId::BrowserCache => entry(
                "Browser cache",
                "browser-cache",
                everywhere,
                browser_caches::clean,
            ),
            TaskId::Trash => entry("Trash", "trash", unix_desktop, trash::clean),
            TaskId::SystemLogs => entry("System logs", "system-logs", linux, system_logs::clean),
            TaskId::AptCache => entry("Apt cache", "apt-cache", linux, package_caches::clean_apt),
            TaskId::PipCache => entry("Pip cache", "pip-cache", everywhere, package_caches::clean_pip),
            TaskId::ThumbnailCache => entry(
                "Thumbnail cache",
                "thumbnail-cache",
                linux,
                thumbnails::clean,
            ),
            TaskId::DockerPrune => entry("Docker prune", "docker-prune", everywhere, docker::clean),
            TaskId::FlatpakCache => entry(
                "Flatpak cache",
                "flatpak-cache",
                linux,
                package_caches::clean_flatpak,
            ),
            TaskId::SnapCache => entry("Snap cache", "snap-cache", linux, package_caches::clean_snap),
            TaskId::AutoremovePackages => entry(
                "Autoremove packages",
                "autoremove-packages",
                linux,
                autoremove::clean,
            ),
            TaskId::Defragmentation => entry(
                "Defragmentation",
                "defragmentation",
                linux_or_windows,
                defrag::clean,
            ),
            TaskId::RegistryClean => entry(
                "Registry clean",
                "registry-clean",
                windows,
                registry_clean::clean,
            ),
        }
    }
}

fn entry(
    name: &'static str,
    slug: &'static str,
    applicable: fn(Platform) -> bool,
    operation: Operation,
) -> Task {
    Task {
        name,
        slug,
        applicable,
        operation,
    }
}

fn everywhere(_: Platform) -> bool {
    true
}

fn linux(platform: Platform) -> bool {
    platform == Platform::Linux
}

fn windows(platform: Platform) -> bool {
    platform == Platform::Windows
}

fn linux_or_windows(platform: Platform) -> bool {
    matches!(platform, Platform::Linux | Platform::Windows)
}

fn unix_desktop(platform: Platform) -> bool {
    matches!(platform, Platform::Linux | Platform::MacOs)
}

/// Fixed name → task table. Built once, never mutated.
pub struct Registry {
    tasks: Vec<Task>,
}

impl Registry {
    pub fn builtin() -> Self {
        Self {
            tasks: TaskId::ALL.iter().map(|id| id.task()).collect(),
        }
    }

    /// Build a registry from an explicit table. Names and slugs must be unique.
    #[cfg(test)]
    pub fn new(tasks: Vec<Task>) -> Self {
        assert!(has_unique_keys(&tasks), "task names and slugs must be unique");
        Self { tasks }
    }

    /// Resolve a task by its label, or by its slug.
    pub fn lookup(&self, name: &str) -> Result<&Task, RegistryError> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .or_else(|| self.tasks.iter().find(|t| t.slug == name))
            .ok_or_else(|| RegistryError::UnknownTask(name.to_string()))
    }

    pub fn all_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name).collect()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}

/// Everything a task operation may read. Shared by all tasks of a run.
pub struct TaskContext {
    pub platform: Platform,
    pub home: Option<PathBuf>,
    /// Per-user cache root (`~/.cache`, `~/Library/Caches`, `%LOCALAPPDATA%`).
    pub cache_dir: Option<PathBuf>,
    pub temp_dirs: Vec<PathBuf>,
    /// Prefix for system-wide paths such as `/var/cache/apt`.
    pub system_root: PathBuf,
    pub runner: Arc<dyn CommandRunner>,
    pub command_timeout: Option<Duration>,
}

impl TaskContext {
    /// Context for the current host.
    pub fn detect(runner: Arc<dyn CommandRunner>, command_timeout: Option<Duration>) -> Self {
        Self {
            platform: Platform::current(),
            home: dirs::home_dir(),
            cache_dir: dirs::cache_dir(),
            temp_dirs: temp_dirs(),
            system_root: PathBuf::from("/"),
            runner,
            command_timeout,
        }
    }

    pub fn home(&self) -> Result<&Path, TaskError> {
        self.home.as_deref().ok_or(TaskError::NoHome)
    }

    pub fn cache_dir(&self) -> Result<PathBuf, TaskError> {
        match (&self.cache_dir, &self.home) {
            (Some(cache), _) => Ok(cache.clone()),
            (None, Some(home)) => Ok(home.join(".cache")),
            (None, None) => Err(TaskError::NoHome),
        }
    }

    /// A command spec carrying the configured per-invocation timeout.
    pub fn command(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program).timeout(self.command_timeout)
    }

    /// Run a command and treat a non-zero exit as a task failure.
    pub fn run_checked(&self, spec: CommandSpec) -> Result<CommandResult, TaskError> {
        let result = self.runner.run(&spec)?;
        if result.success() {
            Ok(result)
        } else {
            Err(TaskError::NonZeroExit {
                program: spec.program,
                code: result.exit_code,
                detail: result.last_line(),
            })
        }
    }
}

#[cfg(test)]
fn has_unique_keys(tasks: &[Task]) -> bool {
    tasks.iter().enumerate().all(|(i, task)| {
        !tasks[..i]
            .iter()
            .any(|t| t.name == task.name || t.slug == task.slug)
    })
}

/// Candidate temp roots, deduplicated in discovery order.
fn temp_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = ["TMP", "TEMP", "TMPDIR"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .collect();
    dirs.push(std::env::temp_dir());

    let mut unique: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        if !unique.contains(&dir) {
            unique.push(dir);
        }
    }
    unique
}

/// Erase the children of a directory, mapping listing errors to the task.
pub(crate) fn erase_children_of(dir: &Path) -> Result<u64, TaskError> {
    crate::eraser::erase_children(dir).map_err(|source| TaskError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
pub(crate) fn test_context(
    root: &Path,
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
) -> TaskContext {
    let home = root.join("home");
    TaskContext {
        platform,
        cache_dir: Some(home.join(".cache")),
        home: Some(home),
        temp_dirs: vec![root.join("tmp")],
        system_root: root.join("sysroot"),
        runner,
        command_timeout: Some(Duration::from_secs(5)),
    }
}
