#[cfg(feature = "gui")]
mod app;
mod cli;
mod config;
mod disk_info;
mod eraser;
mod error;
mod notify;
mod orchestrator;
mod output;
mod platform;
mod post_run;
mod report;
mod runner;
mod schedule;
mod tasks;
mod utils;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "tidysweep=warn",
        1 => "tidysweep=info",
        _ => "tidysweep=debug",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);
    cli::run(cli)
}
