//! Registering a periodic unattended run with the host scheduler.
//!
//! Cron on Linux and macOS, Task Scheduler on Windows. Re-registering
//! replaces the previous entry rather than adding a second one.

use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ScheduleError;
use crate::platform::Platform;
use crate::runner::{CommandRunner, CommandSpec};

/// Trailing marker identifying our crontab line.
const CRON_MARKER: &str = "# tidysweep";
const TASK_NAME: &str = "TidySweep";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    #[cfg_attr(not(feature = "gui"), allow(dead_code))]
    pub const ALL: [Frequency; 3] = [Frequency::Daily, Frequency::Weekly, Frequency::Monthly];

    /// Every run fires at 02:00 local time.
    pub fn cron_expr(self) -> &'static str {
        match self {
            Frequency::Daily => "0 2 * * *",
            Frequency::Weekly => "0 2 * * 0",
            Frequency::Monthly => "0 2 1 * *",
        }
    }

    fn schtasks_name(self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::Monthly => "Monthly",
        }
    }
}

pub trait Scheduler {
    /// Register `executable run --from-config` at `frequency`.
    /// Returns a human-readable confirmation.
    fn register_periodic(
        &self,
        executable: &Path,
        frequency: Frequency,
    ) -> Result<String, ScheduleError>;
}

pub struct SystemScheduler {
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
}

impl SystemScheduler {
    pub fn new(platform: Platform, runner: Arc<dyn CommandRunner>) -> Self {
        Self { platform, runner }
    }

    fn register_cron(&self, executable: &Path, frequency: Frequency) -> Result<String, ScheduleError> {
        // No crontab yet is reported as a failed `crontab -l`; start from empty.
        let current = self.runner.run(&CommandSpec::new("crontab").arg("-l"))?;
        let existing = if current.success() {
            current.stdout
        } else {
            debug!(detail = %current.last_line(), "no readable crontab, starting fresh");
            String::new()
        };

        let table = cron_table(&existing, executable, frequency);
        let installed = self
            .runner
            .run(&CommandSpec::new("crontab").arg("-").stdin(table))?;
        if !installed.success() {
            return Err(ScheduleError::Rejected {
                program: "crontab".to_string(),
                detail: installed.last_line(),
            });
        }
        Ok(format!("Scheduled {} cleanup via cron", frequency.label().to_lowercase()))
    }

    fn register_schtasks(
        &self,
        executable: &Path,
        frequency: Frequency,
    ) -> Result<String, ScheduleError> {
        let action = format!("\"{}\" run --from-config", executable.display());
        let spec = CommandSpec::new("schtasks").args([
            "/Create",
            "/SC",
            frequency.schtasks_name(),
            "/TN",
            TASK_NAME,
            "/TR",
            action.as_str(),
            "/ST",
            "02:00",
            "/F",
        ]);
        let result = self.runner.run(&spec)?;
        if !result.success() {
            return Err(ScheduleError::Rejected {
                program: "schtasks".to_string(),
                detail: result.last_line(),
            });
        }
        Ok(format!(
            "Scheduled {} cleanup via Task Scheduler",
            frequency.label().to_lowercase()
        ))
    }
}

impl Scheduler for SystemScheduler {
    fn register_periodic(
        &self,
        executable: &Path,
        frequency: Frequency,
    ) -> Result<String, ScheduleError> {
        let confirmation = match self.platform {
            Platform::Linux | Platform::MacOs => self.register_cron(executable, frequency)?,
            Platform::Windows => self.register_schtasks(executable, frequency)?,
            Platform::Other => return Err(ScheduleError::Unsupported(self.platform)),
        };
        info!(frequency = frequency.label(), "periodic run registered");
        Ok(confirmation)
    }
}

/// `existing` with any previous tidysweep line replaced by a fresh one.
fn cron_table(existing: &str, executable: &Path, frequency: Frequency) -> String {
    let mut table: String = existing
        .lines()
        .filter(|line| !line.trim_end().ends_with(CRON_MARKER))
        .map(|line| format!("{line}\n"))
        .collect();
    // cron turns a bare `%` into a newline
    let executable = executable.display().to_string().replace('%', "\\%");
    table.push_str(&format!(
        "{} \"{executable}\" run --from-config {CRON_MARKER}\n",
        frequency.cron_expr(),
    ));
    table
}
