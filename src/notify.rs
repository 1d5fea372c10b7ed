//! Post-run notifications: email over SMTP and a Slack-style webhook.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde_json::json;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::DeliveryError;
use crate::runner::{CommandRunner, CommandSpec};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);
const SMTP_TIMEOUT: Duration = Duration::from_secs(60);
const SMTPS_PORT: u16 = 465;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

/// What happened to one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent(String),
    /// Nothing was attempted because the channel is not configured.
    Skipped(String),
}

impl Delivery {
    pub fn message(&self) -> &str {
        match self {
            Delivery::Sent(msg) | Delivery::Skipped(msg) => msg,
        }
    }
}

pub trait Notifier {
    fn notify_email(&self, to: &str, subject: &str, body: &str) -> Result<Delivery, DeliveryError>;

    fn notify_webhook(&self, url: &str, body: &str) -> Result<Delivery, DeliveryError>;
}

/// Email through `curl`'s SMTP client, webhooks through `reqwest`.
pub struct DefaultNotifier {
    smtp: Option<SmtpSettings>,
    runner: Arc<dyn CommandRunner>,
}

impl DefaultNotifier {
    pub fn new(smtp: Option<SmtpSettings>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { smtp, runner }
    }
}

impl Notifier for DefaultNotifier {
    fn notify_email(&self, to: &str, subject: &str, body: &str) -> Result<Delivery, DeliveryError> {
        let Some(smtp) = &self.smtp else {
            return Ok(Delivery::Skipped(
                "Email skipped: SMTP is not configured".to_string(),
            ));
        };

        let credentials = [
            ("server", &smtp.server),
            ("user", &smtp.user),
            ("password", &smtp.password),
        ];
        for (field, value) in credentials {
            if value.chars().any(char::is_whitespace) {
                return Err(DeliveryError::InvalidField {
                    field,
                    problem: "must not contain whitespace",
                });
            }
        }
        for (field, value) in [("recipient", to), ("subject", subject)] {
            if value.contains(['\r', '\n']) {
                return Err(DeliveryError::InvalidField {
                    field,
                    problem: "must be a single line",
                });
            }
        }

        // Credentials go through a netrc file so they never show up in argv.
        let mut netrc = NamedTempFile::new()?;
        writeln!(
            netrc,
            "machine {} login {} password {}",
            smtp.server, smtp.user, smtp.password
        )?;
        netrc.flush()?;

        let spec = curl_spec(smtp, to, &netrc.path().display().to_string())
            .stdin(compose_message(&smtp.user, to, subject, body));
        debug!(server = %smtp.server, port = smtp.port, "sending email");
        let result = self.runner.run(&spec)?;
        if !result.success() {
            return Err(DeliveryError::Rejected {
                channel: "email",
                detail: result.last_line(),
            });
        }
        info!(to, "email notification sent");
        Ok(Delivery::Sent(format!("Email sent: {to}")))
    }

    fn notify_webhook(&self, url: &str, body: &str) -> Result<Delivery, DeliveryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        let response = client.post(url).json(&json!({ "text": body })).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        info!("webhook notification sent");
        Ok(Delivery::Sent("Webhook notification sent".to_string()))
    }
}

fn curl_spec(smtp: &SmtpSettings, to: &str, netrc_path: &str) -> CommandSpec {
    let scheme = if smtp.port == SMTPS_PORT { "smtps" } else { "smtp" };
    let mut spec = CommandSpec::new("curl")
        .args(["--silent", "--show-error", "--url"])
        .arg(format!("{scheme}://{}:{}", smtp.server, smtp.port));
    if smtp.port != SMTPS_PORT {
        spec = spec.arg("--ssl-reqd");
    }
    spec.arg("--mail-from")
        .arg(smtp.user.as_str())
        .arg("--mail-rcpt")
        .arg(to)
        .arg("--netrc-file")
        .arg(netrc_path)
        .args(["--upload-file", "-"])
        .timeout(Some(SMTP_TIMEOUT))
}

/// A minimal RFC 5322 plain-text message with CRLF line endings.
fn compose_message(from: &str, to: &str, subject: &str, body: &str) -> String {
    let headers = [
        format!("From: {from}"),
        format!("To: {to}"),
        format!("Subject: {subject}"),
        format!("Date: {}", Local::now().to_rfc2822()),
        "MIME-Version: 1.0".to_string(),
        "Content-Type: text/plain; charset=utf-8".to_string(),
    ];
    let body = body.lines().collect::<Vec<_>>().join("\r\n");
    format!("{}\r\n\r\n{body}\r\n", headers.join("\r\n"))
}
