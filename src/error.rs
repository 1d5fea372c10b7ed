//! Error types shared across the crate.
//!
//! Unit-level errors (`TaskError`, `RegistryError`) never escape a run: the
//! orchestrator turns them into ledger entries. Collaborator errors
//! (`CommandError`, `DeliveryError`, `ScheduleError`) surface as log lines.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::platform::Platform;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown task: {0}")]
    UnknownTask(String),
}

/// An external program could not be driven to completion.
///
/// A non-zero exit status is not an error at this level.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("could not start `{program}`: {source}")]
    Invocation {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {}", format_timeout(.timeout))]
    TimedOut { program: String, timeout: Duration },

    #[error("lost track of `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("`{program}` exited with {}{}", describe_exit(.code), describe_detail(.detail))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("home directory is not available")]
    NoHome,

    #[error("cannot read {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {}: {source}", .path.display())]
    Erase {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to erase {path}: {reason}")]
    Refused { path: String, reason: &'static str },

    #[error("{0}")]
    Other(String),
}

impl TaskError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Command(CommandError::TimedOut { .. }))
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("could not prepare message: {0}")]
    Io(#[from] std::io::Error),

    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook answered with HTTP {0}")]
    Status(u16),

    #[error("{channel} delivery rejected: {detail}")]
    Rejected {
        channel: &'static str,
        detail: String,
    },

    #[error("email {field} {problem}")]
    InvalidField {
        field: &'static str,
        problem: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("scheduling is not supported on {0}")]
    Unsupported(Platform),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("`{program}` rejected the schedule: {detail}")]
    Rejected { program: String, detail: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn format_timeout(timeout: &Duration) -> String {
    humantime::format_duration(*timeout).to_string()
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

fn describe_detail(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}
