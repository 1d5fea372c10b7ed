//! The run loop: resolve each work unit, execute it behind a failure
//! boundary, and keep an ordered ledger plus an exact progress count.
//!
//! Units run strictly one after another in the order supplied. Nothing a
//! unit does (error or panic) can stop the batch; every unit ends up as
//! exactly one `Outcome`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::eraser;
use crate::error::TaskError;
use crate::report::Reporter;
use crate::tasks::{Registry, TaskContext, TaskReport};

/// One atomic thing the orchestrator executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkUnit {
    RegistryTask(String),
    CustomPath(String),
}

impl WorkUnit {
    pub fn label(&self) -> String {
        match self {
            WorkUnit::RegistryTask(name) => name.clone(),
            WorkUnit::CustomPath(path) => format!("Custom path {path}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownTask,
    Operation,
    TimedOut,
    Panicked,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    Success,
    Failure { kind: FailureKind, message: String },
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

/// Result of one work unit. Never changes once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub unit_label: String,
    #[serde(flatten)]
    pub status: Status,
    pub freed_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

/// Ordered, append-only record of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Ledger {
    outcomes: Vec<Outcome>,
}

impl Ledger {
    fn push(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn freed_bytes(&self) -> u64 {
        self.outcomes.iter().map(|o| o.freed_bytes).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    pub completed: usize,
    pub total: usize,
}

impl RunProgress {
    fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
        }
    }

    fn advance(&mut self) {
        assert!(
            self.completed < self.total,
            "progress overflow: {}/{}",
            self.completed,
            self.total
        );
        self.completed += 1;
    }

    /// Completion ratio for progress bars. An empty run counts as done.
    #[cfg_attr(not(feature = "gui"), allow(dead_code))]
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
}

/// Everything `run` hands back. Read-only from here on.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub ledger: Ledger,
    pub progress: RunProgress,
    pub state: RunState,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

/// Shared flag checked between work units.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Surface removal errors on custom paths instead of absorbing them.
    pub strict_erase: bool,
}

pub struct Orchestrator {
    registry: Registry,
    ctx: TaskContext,
    options: RunOptions,
    cancel: CancelToken,
    state: RunState,
}

impl Orchestrator {
    pub fn new(registry: Registry, ctx: TaskContext, options: RunOptions) -> Self {
        Self {
            registry,
            ctx,
            options,
            cancel: CancelToken::default(),
            state: RunState::Idle,
        }
    }

    /// Use an externally owned cancellation flag.
    #[cfg_attr(not(feature = "gui"), allow(dead_code))]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute the selected tasks, then the custom paths, each in the order given.
    pub fn run(
        &mut self,
        selected: &[String],
        custom_paths: &[String],
        reporter: &mut dyn Reporter,
    ) -> RunReport {
        let units: Vec<WorkUnit> = selected
            .iter()
            .cloned()
            .map(WorkUnit::RegistryTask)
            .chain(custom_paths.iter().cloned().map(WorkUnit::CustomPath))
            .collect();

        let started_at = Local::now();
        let mut ledger = Ledger::default();
        let mut progress = RunProgress::new(selected.len() + custom_paths.len());
        self.state = RunState::Running;
        info!(total = progress.total, "cleanup run started");

        for unit in &units {
            let outcome = if self.cancel.is_cancelled() {
                Outcome {
                    unit_label: unit.label(),
                    status: Status::Failure {
                        kind: FailureKind::Cancelled,
                        message: "cancelled before start".to_string(),
                    },
                    freed_bytes: 0,
                    note: None,
                    elapsed: Duration::ZERO,
                }
            } else {
                self.execute(unit)
            };

            match &outcome.status {
                Status::Success => {
                    info!(unit = %outcome.unit_label, freed = outcome.freed_bytes, "unit done")
                }
                Status::Failure { kind, message } => {
                    warn!(unit = %outcome.unit_label, ?kind, error = %message, "unit failed")
                }
            }

            progress.advance();
            reporter.record(&outcome, progress);
            ledger.push(outcome);
        }

        self.state = RunState::Completed;
        assert_eq!(progress.completed, progress.total, "every unit must be accounted for");
        info!(
            succeeded = ledger.succeeded(),
            failed = ledger.failed(),
            "cleanup run completed"
        );

        RunReport {
            ledger,
            progress,
            state: self.state,
            started_at,
            finished_at: Local::now(),
        }
    }

    fn execute(&self, unit: &WorkUnit) -> Outcome {
        let started = Instant::now();
        debug!(unit = %unit.label(), "executing");
        let (status, report) = match unit {
            WorkUnit::RegistryTask(name) => self.execute_task(name),
            WorkUnit::CustomPath(raw) => self.execute_path(raw),
        };
        Outcome {
            unit_label: unit.label(),
            status,
            freed_bytes: report.freed_bytes,
            note: report.note,
            elapsed: started.elapsed(),
        }
    }

    fn execute_task(&self, name: &str) -> (Status, TaskReport) {
        let task = match self.registry.lookup(name) {
            Ok(task) => task,
            Err(e) => return failure(FailureKind::UnknownTask, e.to_string()),
        };
        if !task.applicable_on(self.ctx.platform) {
            return (
                Status::Success,
                TaskReport::noted(format!("not supported on {}", self.ctx.platform)),
            );
        }
        let operation = task.operation;
        isolate(|| operation(&self.ctx))
    }

    fn execute_path(&self, raw: &str) -> (Status, TaskReport) {
        let path = match eraser::resolve_target(raw, self.ctx.home.as_deref()) {
            Ok(path) => path,
            Err(e) => return failure(FailureKind::Operation, e.to_string()),
        };
        if self.options.strict_erase {
            isolate(|| {
                eraser::try_erase(&path)
                    .map(TaskReport::freed)
                    .map_err(|source| TaskError::Erase {
                        path: path.clone(),
                        source,
                    })
            })
        } else {
            isolate(|| Ok(TaskReport::freed(eraser::erase(&path))))
        }
    }
}

/// The failure-isolating boundary: errors and panics become a status.
fn isolate<F>(operation: F) -> (Status, TaskReport)
where
    F: FnOnce() -> Result<TaskReport, TaskError>,
{
    match panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(Ok(report)) => (Status::Success, report),
        Ok(Err(e)) => {
            let kind = if e.is_timeout() {
                FailureKind::TimedOut
            } else {
                FailureKind::Operation
            };
            failure(kind, e.to_string())
        }
        Err(payload) => failure(FailureKind::Panicked, panic_message(payload.as_ref())),
    }
}

fn failure(kind: FailureKind, message: String) -> (Status, TaskReport) {
    (Status::Failure { kind, message }, TaskReport::default())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandError;
    use crate::platform::Platform;
    use crate::report::tests::RecordingReporter;
    use crate::runner::fake::FakeRunner;
    use crate::tasks::{test_context, Task};
    use tempfile::TempDir;

    fn ok_op(_: &TaskContext) -> Result<TaskReport, TaskError> {
        Ok(TaskReport::freed(10))
    }

    fn failing_op(_: &TaskContext) -> Result<TaskReport, TaskError> {
        Err(TaskError::Other("disk on fire".to_string()))
    }

    fn panicking_op(_: &TaskContext) -> Result<TaskReport, TaskError> {
        panic!("index out of bounds")
    }

    fn slow_op(_: &TaskContext) -> Result<TaskReport, TaskError> {
        Err(CommandError::TimedOut {
            program: "defrag".to_string(),
            timeout: Duration::from_secs(60),
        }
        .into())
    }

    fn everywhere(_: Platform) -> bool {
        true
    }

    fn windows_only(p: Platform) -> bool {
        p == Platform::Windows
    }

    fn task(name: &'static str, slug: &'static str, operation: crate::tasks::Operation) -> Task {
        Task {
            name,
            slug,
            applicable: everywhere,
            operation,
        }
    }

    fn test_registry() -> Registry {
        Registry::new(vec![
            task("Ok", "ok", ok_op),
            task("Ok2", "ok2", ok_op),
            task("Boom", "boom", failing_op),
            task("Panic", "panic", panicking_op),
            task("Slow", "slow", slow_op),
            Task {
                name: "WinOnly",
                slug: "win-only",
                applicable: windows_only,
                operation: panicking_op,
            },
        ])
    }

    fn orchestrator(dir: &TempDir, registry: Registry) -> Orchestrator {
        let ctx = test_context(dir.path(), Platform::Linux, Arc::new(FakeRunner::ok()));
        Orchestrator::new(registry, ctx, RunOptions::default())
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn labels(report: &RunReport) -> Vec<&str> {
        report
            .ledger
            .outcomes()
            .iter()
            .map(|o| o.unit_label.as_str())
            .collect()
    }

    #[test]
    fn ledger_and_progress_cover_every_unit_in_order() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, test_registry());
        let mut reporter = RecordingReporter::default();
        let present = dir.path().join("present.txt");
        std::fs::write(&present, b"abc").unwrap();
        let paths = vec![
            present.display().to_string(),
            dir.path().join("absent").display().to_string(),
        ];

        let report = orch.run(&names(&["Ok2", "Boom", "Ok"]), &paths, &mut reporter);

        assert_eq!(report.ledger.len(), 5);
        assert_eq!(report.progress, RunProgress { completed: 5, total: 5 });
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(orch.state(), RunState::Completed);
        assert_eq!(
            labels(&report),
            vec![
                "Ok2".to_string(),
                "Boom".to_string(),
                "Ok".to_string(),
                format!("Custom path {}", paths[0]),
                format!("Custom path {}", paths[1]),
            ]
        );
        let recorded: Vec<usize> = reporter.records.iter().map(|(_, p)| p.completed).collect();
        assert_eq!(recorded, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn failing_operation_is_isolated() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, test_registry());

        let report = orch.run(
            &names(&["Ok", "Boom", "Ok2"]),
            &[],
            &mut RecordingReporter::default(),
        );
        let outcomes = report.ledger.outcomes();

        assert_eq!(outcomes[0].status, Status::Success);
        assert_eq!(outcomes[0].freed_bytes, 10);
        assert_eq!(
            outcomes[1].status,
            Status::Failure {
                kind: FailureKind::Operation,
                message: "disk on fire".to_string()
            }
        );
        assert_eq!(outcomes[2].status, Status::Success);
        assert_eq!(outcomes[2].freed_bytes, 10);
        assert_eq!(report.ledger.succeeded(), 2);
        assert_eq!(report.ledger.failed(), 1);
        assert_eq!(report.ledger.freed_bytes(), 20);
    }

    #[test]
    fn panicking_operation_is_isolated() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, test_registry());

        let report = orch.run(&names(&["Panic", "Ok"]), &[], &mut RecordingReporter::default());
        let outcomes = report.ledger.outcomes();

        assert!(matches!(
            &outcomes[0].status,
            Status::Failure { kind: FailureKind::Panicked, message } if message.contains("index out of bounds")
        ));
        assert!(outcomes[1].status.is_success());
        assert_eq!(report.progress, RunProgress { completed: 2, total: 2 });
    }

    #[test]
    fn unknown_task_yields_one_failure() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, Registry::builtin());

        let report = orch.run(&names(&["BadTask"]), &[], &mut RecordingReporter::default());

        assert_eq!(report.ledger.len(), 1);
        assert_eq!(
            report.ledger.outcomes()[0].status,
            Status::Failure {
                kind: FailureKind::UnknownTask,
                message: "unknown task: BadTask".to_string()
            }
        );
        assert_eq!(report.progress, RunProgress { completed: 1, total: 1 });
    }

    #[test]
    fn unknown_task_does_not_disturb_neighbours() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, test_registry());

        let report = orch.run(
            &names(&["Ok", "Nope", "Ok2"]),
            &[],
            &mut RecordingReporter::default(),
        );
        let statuses: Vec<bool> = report
            .ledger
            .outcomes()
            .iter()
            .map(|o| o.status.is_success())
            .collect();
        assert_eq!(statuses, vec![true, false, true]);
    }

    #[test]
    fn empty_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, test_registry());
        let mut reporter = RecordingReporter::default();

        let report = orch.run(&[], &[], &mut reporter);

        assert!(report.ledger.is_empty());
        assert_eq!(report.progress, RunProgress { completed: 0, total: 0 });
        assert_eq!(report.state, RunState::Completed);
        assert!(reporter.records.is_empty());
        assert!(reporter.finalized.is_empty());
    }

    #[test]
    fn trash_without_trash_directory_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, Registry::builtin());

        let report = orch.run(&names(&["Trash"]), &[], &mut RecordingReporter::default());

        assert_eq!(report.ledger.len(), 1);
        assert_eq!(report.ledger.outcomes()[0].status, Status::Success);
        assert_eq!(report.progress, RunProgress { completed: 1, total: 1 });
    }

    #[test]
    fn custom_paths_existing_and_missing_both_succeed() {
        let dir = TempDir::new().unwrap();
        let x = dir.path().join("x");
        std::fs::create_dir_all(x.join("nested")).unwrap();
        std::fs::write(x.join("nested/file"), vec![0u8; 25]).unwrap();
        let y = dir.path().join("y");
        let mut orch = orchestrator(&dir, test_registry());

        let report = orch.run(
            &[],
            &[x.display().to_string(), y.display().to_string()],
            &mut RecordingReporter::default(),
        );

        assert!(report.ledger.outcomes().iter().all(|o| o.status.is_success()));
        assert_eq!(report.ledger.outcomes()[0].freed_bytes, 25);
        assert_eq!(report.progress, RunProgress { completed: 2, total: 2 });
        assert!(!x.exists());
    }

    #[test]
    fn refused_custom_path_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, test_registry());

        let report = orch.run(&[], &names(&["", "~"]), &mut RecordingReporter::default());

        assert_eq!(report.ledger.failed(), 2);
        assert!(matches!(
            &report.ledger.outcomes()[1].status,
            Status::Failure { message, .. } if message.ends_with("home directory")
        ));
    }

    #[test]
    fn inapplicable_task_is_skipped_as_success() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, test_registry());

        let report = orch.run(&names(&["WinOnly"]), &[], &mut RecordingReporter::default());
        let outcome = &report.ledger.outcomes()[0];

        assert_eq!(outcome.status, Status::Success);
        assert_eq!(outcome.note.as_deref(), Some("not supported on linux"));
    }

    #[test]
    fn builtin_inapplicable_task_never_runs_a_command() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::ok());
        let ctx = test_context(dir.path(), Platform::Linux, runner.clone());
        let mut orch = Orchestrator::new(Registry::builtin(), ctx, RunOptions::default());

        let report = orch.run(&names(&["Registry clean"]), &[], &mut RecordingReporter::default());

        assert!(report.ledger.outcomes()[0].status.is_success());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn timeouts_are_their_own_failure_kind() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, test_registry());

        let report = orch.run(&names(&["Slow"]), &[], &mut RecordingReporter::default());

        assert!(matches!(
            report.ledger.outcomes()[0].status,
            Status::Failure { kind: FailureKind::TimedOut, .. }
        ));
    }

    #[test]
    fn cancellation_records_remaining_units_without_running_them() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelToken::default();
        let mut orch = orchestrator(&dir, test_registry()).with_cancel(cancel.clone());
        let mut reporter = RecordingReporter::cancelling_after(1, cancel);

        let report = orch.run(&names(&["Ok", "Panic", "Boom"]), &names(&["/tmp/x"]), &mut reporter);
        let kinds: Vec<Option<FailureKind>> = report
            .ledger
            .outcomes()
            .iter()
            .map(|o| match &o.status {
                Status::Success => None,
                Status::Failure { kind, .. } => Some(*kind),
            })
            .collect();

        assert_eq!(
            kinds,
            vec![
                None,
                Some(FailureKind::Cancelled),
                Some(FailureKind::Cancelled),
                Some(FailureKind::Cancelled),
            ]
        );
        assert_eq!(report.progress, RunProgress { completed: 4, total: 4 });
    }

    #[test]
    fn ledger_is_fresh_for_every_run() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir, test_registry());

        orch.run(&names(&["Ok", "Boom"]), &[], &mut RecordingReporter::default());
        let second = orch.run(&names(&["Ok2"]), &[], &mut RecordingReporter::default());

        assert_eq!(labels(&second), vec!["Ok2"]);
        assert_eq!(second.progress, RunProgress { completed: 1, total: 1 });
    }

    #[test]
    fn strict_erase_counts_absent_paths_as_success() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), Platform::Linux, Arc::new(FakeRunner::ok()));
        let mut orch = Orchestrator::new(
            test_registry(),
            ctx,
            RunOptions { strict_erase: true },
        );
        let existing = dir.path().join("scratch");
        std::fs::write(&existing, vec![0u8; 8]).unwrap();

        let report = orch.run(
            &[],
            &[existing.display().to_string(), dir.path().join("gone").display().to_string()],
            &mut RecordingReporter::default(),
        );

        assert_eq!(report.ledger.succeeded(), 2);
        assert_eq!(report.ledger.outcomes()[0].freed_bytes, 8);
    }

    #[cfg(unix)]
    #[test]
    fn strict_erase_turns_removal_errors_into_failures() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        let below_file = vec![file.join("child").display().to_string()];

        let run = |strict_erase| {
            let ctx = test_context(dir.path(), Platform::Linux, Arc::new(FakeRunner::ok()));
            Orchestrator::new(test_registry(), ctx, RunOptions { strict_erase }).run(
                &[],
                &below_file,
                &mut RecordingReporter::default(),
            )
        };

        let strict = run(true);
        match &strict.ledger.outcomes()[0].status {
            Status::Failure { kind, message } => {
                assert_eq!(*kind, FailureKind::Operation);
                assert!(message.contains("child"), "{message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(strict.progress, RunProgress { completed: 1, total: 1 });

        let lenient = run(false);
        assert_eq!(lenient.ledger.outcomes()[0].status, Status::Success);
        assert!(file.is_file());
    }

    #[test]
    fn outcome_serializes_with_flat_status() {
        let outcome = Outcome {
            unit_label: "BadTask".to_string(),
            status: Status::Failure {
                kind: FailureKind::UnknownTask,
                message: "unknown task: BadTask".to_string(),
            },
            freed_bytes: 0,
            note: None,
            elapsed: Duration::from_millis(3),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "unknown_task");
        assert_eq!(json["message"], "unknown task: BadTask");
        assert_eq!(json["elapsed"], "3ms");
        assert!(json.get("note").is_none());
    }
}
