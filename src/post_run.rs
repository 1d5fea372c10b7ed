//! What happens after the last unit: scheduling, notifications, and the
//! final report. Nothing here can change the ledger.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::notify::Notifier;
use crate::orchestrator::RunReport;
use crate::report::{render_ledger, Reporter};
use crate::schedule::{Frequency, Scheduler};

pub const SUBJECT: &str = "tidysweep: cleanup complete";

#[derive(Debug, Clone, Default)]
pub struct PostRunOptions {
    pub schedule: Option<Frequency>,
    /// Binary the scheduler should invoke.
    pub executable: Option<PathBuf>,
    pub email: String,
    pub webhook: String,
}

/// Run the post-run actions in order and finalize the reporter.
/// Returns the notice lines that were emitted.
///
/// A run with no units finalizes locally and contacts nothing else.
pub fn finish_run(
    report: &RunReport,
    options: &PostRunOptions,
    scheduler: &dyn Scheduler,
    notifier: &dyn Notifier,
    reporter: &mut dyn Reporter,
) -> Vec<String> {
    let mut notices = Vec::new();
    let body = render_ledger(&report.ledger, report.progress);

    if report.ledger.is_empty() {
        debug!("empty run, skipping scheduling and notifications");
        reporter.finalize(&body);
        return notices;
    }

    if let Some(frequency) = options.schedule {
        let line = match &options.executable {
            Some(exe) => match scheduler.register_periodic(exe, frequency) {
                Ok(confirmation) => confirmation,
                Err(e) => {
                    warn!(error = %e, "scheduling failed");
                    format!("Scheduling failed: {e}")
                }
            },
            None => "Scheduling failed: cannot locate the tidysweep executable".to_string(),
        };
        emit(reporter, &mut notices, line);
    }

    let email = options.email.trim();
    if !email.is_empty() {
        let line = match notifier.notify_email(email, SUBJECT, &body) {
            Ok(delivery) => delivery.message().to_string(),
            Err(e) => {
                warn!(error = %e, "email notification failed");
                format!("Email failed: {e}")
            }
        };
        emit(reporter, &mut notices, line);
    }

    let webhook = options.webhook.trim();
    if !webhook.is_empty() {
        let line = match notifier.notify_webhook(webhook, &body) {
            Ok(delivery) => delivery.message().to_string(),
            Err(e) => {
                warn!(error = %e, "webhook notification failed");
                format!("Webhook failed: {e}")
            }
        };
        emit(reporter, &mut notices, line);
    }

    reporter.finalize(&body);
    notices
}

fn emit(reporter: &mut dyn Reporter, notices: &mut Vec<String>, line: String) {
    reporter.notice(&line);
    notices.push(line);
}
