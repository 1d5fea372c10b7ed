use colored::Colorize;

use crate::disk_info::DiskInfo;
use crate::orchestrator::{Outcome, RunProgress, Status};
use crate::platform::Platform;
use crate::report::Reporter;
use crate::tasks::Task;
use crate::utils::format_size;

pub fn print_banner() {
    println!(
        "{}",
        concat!("tidysweep - cleanup tool v", env!("CARGO_PKG_VERSION"))
            .bold()
            .cyan()
    );
    println!();
}

pub fn print_task_list(tasks: &[Task], platform: Platform) {
    println!("{}", format!("=== Tasks on {platform} ===").bold().white());
    for task in tasks {
        let availability = if task.applicable_on(platform) {
            "available".green()
        } else {
            "not supported".dimmed()
        };
        println!(
            "  {:<22} {:<22} {}",
            task.name,
            task.slug.dimmed(),
            availability
        );
    }
    println!();
}

pub fn print_outcome(outcome: &Outcome, progress: RunProgress) {
    let counter = format!("[{}/{}]", progress.completed, progress.total).dimmed();
    match &outcome.status {
        Status::Success => println!(
            "  {counter} {} {}  {}",
            "Done".green(),
            outcome.unit_label,
            format_size(outcome.freed_bytes).yellow()
        ),
        Status::Failure { message, .. } => println!(
            "  {counter} {} {}: {}",
            "Failed".red().bold(),
            outcome.unit_label,
            message.red()
        ),
    }
    if let Some(note) = &outcome.note {
        println!("        {}", note.dimmed());
    }
}

pub fn print_info(msg: &str) {
    println!("{} {}", "Info:".cyan().bold(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "Warning:".red().bold(), msg.red());
}

pub fn print_separator() {
    println!("  {}", "-".repeat(45).dimmed());
}

pub fn print_summary(summary: &str) {
    let mut lines = summary.lines();
    if let Some(headline) = lines.next() {
        println!("{}", headline.bold().white());
    }
}

pub fn print_disk_delta(before: DiskInfo, after: DiskInfo) {
    let gained = after.available.saturating_sub(before.available);
    println!(
        "  {:<30} {}",
        "Free space before:",
        format_size(before.available)
    );
    println!(
        "  {:<30} {}",
        "Free space after:",
        format_size(after.available).green()
    );
    println!(
        "  {:<30} {}",
        "Reclaimed:".bold(),
        format_size(gained).green().bold()
    );
    println!();
}

/// Streams outcomes to the terminal as they arrive.
pub struct TerminalReporter;

impl Reporter for TerminalReporter {
    fn record(&mut self, outcome: &Outcome, progress: RunProgress) {
        print_outcome(outcome, progress);
    }

    fn notice(&mut self, message: &str) {
        print_info(message);
    }

    fn finalize(&mut self, summary: &str) {
        print_separator();
        print_summary(summary);
    }
}
