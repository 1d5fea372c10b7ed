use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;

use crate::config::Config;
use crate::disk_info::get_disk_info;
use crate::notify::DefaultNotifier;
use crate::orchestrator::{Orchestrator, RunOptions, RunReport};
use crate::output;
use crate::platform::Platform;
use crate::post_run::{finish_run, PostRunOptions};
use crate::report::{NullReporter, Reporter};
use crate::runner::{CommandRunner, SystemRunner};
use crate::schedule::{Frequency, SystemScheduler};
use crate::tasks::{Registry, TaskContext};

#[derive(Parser)]
#[command(
    name = "tidysweep",
    about = "Run a batch of cleanup tasks and report what happened",
    version
)]
pub struct Cli {
    /// Config file (default: <config dir>/tidysweep/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the cleanup tasks and whether they apply to this host
    List {
        /// Print bare task names, one per line
        #[arg(long)]
        names: bool,
    },

    /// Run cleanup tasks and custom paths
    Run(RunArgs),

    /// Open the desktop interface (the default)
    #[cfg(feature = "gui")]
    Gui,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Task to run, by label or slug. Repeatable; runs in the order given.
    #[arg(long = "task", value_name = "NAME")]
    pub tasks: Vec<String>,

    /// Run every task that applies to this platform
    #[arg(long, conflicts_with = "tasks")]
    pub all: bool,

    /// Extra file or directory to erase. Repeatable.
    #[arg(long = "path", value_name = "PATH")]
    pub paths: Vec<String>,

    /// Start from the tasks and paths listed in the config file
    #[arg(long)]
    pub from_config: bool,

    /// Email the summary to this address
    #[arg(long, value_name = "TO")]
    pub email: Option<String>,

    /// POST the summary to this webhook URL
    #[arg(long, value_name = "URL")]
    pub webhook: Option<String>,

    /// Also register a periodic unattended run
    #[arg(long, value_enum, value_name = "FREQUENCY")]
    pub schedule: Option<Frequency>,

    /// Limit for each external command, e.g. "10m". "0s" disables it.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<humantime::Duration>,

    /// Report removal errors on custom paths as failures
    #[arg(long)]
    pub strict_erase: bool,

    /// Print the run report as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// What a `run` invocation resolved to after merging flags and config.
#[derive(Debug, PartialEq, Eq)]
struct RunPlan {
    tasks: Vec<String>,
    paths: Vec<String>,
    email: String,
    webhook: String,
    timeout: Option<Duration>,
    strict_erase: bool,
}

impl RunPlan {
    fn resolve(args: &RunArgs, config: &Config, registry: &Registry, platform: Platform) -> Self {
        let mut tasks = Vec::new();
        let mut paths = Vec::new();
        if args.from_config {
            tasks.extend(config.tasks.iter().cloned());
            paths.extend(config.custom_paths.iter().cloned());
        }
        if args.all {
            tasks.extend(
                registry
                    .tasks()
                    .iter()
                    .filter(|t| t.applicable_on(platform))
                    .map(|t| t.name.to_string()),
            );
        }
        tasks.extend(args.tasks.iter().cloned());
        paths.extend(args.paths.iter().cloned());
        dedup_tasks(&mut tasks, registry);

        let timeout = match args.timeout {
            Some(limit) => {
                let limit: Duration = limit.into();
                (!limit.is_zero()).then_some(limit)
            }
            None => config.timeout(),
        };

        Self {
            tasks,
            paths,
            email: args.email.clone().unwrap_or_else(|| config.notify.email.clone()),
            webhook: args
                .webhook
                .clone()
                .unwrap_or_else(|| config.notify.webhook.clone()),
            timeout,
            strict_erase: args.strict_erase || config.strict_erase,
        }
    }
}

/// Drop repeated selections, keeping the first. A label and its slug count
/// as the same task; unknown names are compared as written.
fn dedup_tasks(tasks: &mut Vec<String>, registry: &Registry) {
    let mut seen = HashSet::new();
    tasks.retain(|name| {
        let key = registry.lookup(name).map_or(name.as_str(), |task| task.name);
        seen.insert(key.to_string())
    });
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a RunReport,
    notices: &'a [String],
}

pub fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Some(Command::List { names }) => {
            let registry = Registry::builtin();
            if names {
                for name in registry.all_names() {
                    println!("{name}");
                }
            } else {
                output::print_task_list(registry.tasks(), Platform::current());
            }
            Ok(())
        }
        Some(Command::Run(args)) => run_cleanup(&args, &config),
        #[cfg(feature = "gui")]
        Some(Command::Gui) | None => crate::app::launch(config),
        #[cfg(not(feature = "gui"))]
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

fn run_cleanup(args: &RunArgs, config: &Config) -> Result<()> {
    let platform = Platform::current();
    let registry = Registry::builtin();
    let plan = RunPlan::resolve(args, config, &registry, platform);

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let ctx = TaskContext::detect(runner.clone(), plan.timeout);
    let disk_root = ctx.home.clone().unwrap_or_else(|| PathBuf::from("/"));
    let before = get_disk_info(&disk_root);

    let mut reporter: Box<dyn Reporter> = if args.json {
        Box::new(NullReporter)
    } else {
        output::print_banner();
        Box::new(output::TerminalReporter)
    };

    let mut orchestrator = Orchestrator::new(
        registry,
        ctx,
        RunOptions {
            strict_erase: plan.strict_erase,
        },
    );
    let report = orchestrator.run(&plan.tasks, &plan.paths, reporter.as_mut());
    if report.ledger.is_empty() && !args.json {
        output::print_warning("nothing selected; pass --task, --all, --path or --from-config");
    }

    let options = PostRunOptions {
        schedule: args.schedule,
        executable: std::env::current_exe().ok(),
        email: plan.email,
        webhook: plan.webhook,
    };
    let scheduler = SystemScheduler::new(platform, runner.clone());
    let notifier = DefaultNotifier::new(config.smtp_settings(), runner);
    let notices = finish_run(&report, &options, &scheduler, &notifier, reporter.as_mut());

    if args.json {
        let json = serde_json::to_string_pretty(&JsonReport {
            report: &report,
            notices: &notices,
        })
        .context("failed to serialize run report")?;
        println!("{json}");
    } else if let (Some(before), Some(after)) = (before, get_disk_info(&disk_root)) {
        output::print_disk_delta(before, after);
    }
    Ok(())
}
