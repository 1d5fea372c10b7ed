use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::notify::SmtpSettings;

const CONFIG_DIR: &str = "tidysweep";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_SMTP_PORT: u16 = 587;

/// User configuration, read from `<config dir>/tidysweep/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Limit for each external command. Zero disables the limit.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
    /// Report removal errors on custom paths instead of skipping them.
    pub strict_erase: bool,
    /// Task names used by `run --from-config`.
    pub tasks: Vec<String>,
    pub custom_paths: Vec<String>,
    pub notify: NotifyConfig,
    pub smtp: SmtpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30 * 60),
            strict_erase: false,
            tasks: Vec::new(),
            custom_paths: Vec::new(),
            notify: NotifyConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub email: String,
    pub webhook: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmtpConfig {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => {
                    debug!("no config directory on this platform, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file does not exist, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config = Self::from_toml_str(&content)
            .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The per-command limit, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (!self.command_timeout.is_zero()).then_some(self.command_timeout)
    }

    /// SMTP settings after environment overrides, `None` if incomplete.
    pub fn smtp_settings(&self) -> Option<SmtpSettings> {
        self.smtp.resolve_with(|key| std::env::var(key).ok())
    }
}

impl SmtpConfig {
    /// `SMTP_SERVER`, `SMTP_PORT`, `EMAIL_USER` and `EMAIL_PASS` win over the file.
    pub fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<SmtpSettings> {
        let pick = |key: &str, file: &Option<String>| {
            lookup(key)
                .or_else(|| file.clone())
                .filter(|v| !v.trim().is_empty())
        };
        let port = lookup("SMTP_PORT")
            .and_then(|p| p.trim().parse().ok())
            .or(self.port)
            .unwrap_or(DEFAULT_SMTP_PORT);

        Some(SmtpSettings {
            server: pick("SMTP_SERVER", &self.server)?,
            port,
            user: pick("EMAIL_USER", &self.user)?,
            password: pick("EMAIL_PASS", &self.password)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.timeout(), Some(Duration::from_secs(1800)));
        assert!(!config.strict_erase);
        assert!(config.tasks.is_empty());
    }

    #[test]
    fn parses_full_file() {
        let config = Config::from_toml_str(
            r#"
            command_timeout = "90s"
            strict_erase = true
            tasks = ["Temp files", "docker-prune"]
            custom_paths = ["~/Downloads/old"]

            [notify]
            email = "me@example.com"
            webhook = "https://hooks.slack.com/services/T/B/X"

            [smtp]
            server = "smtp.example.com"
            port = 465
            user = "robot"
            password = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.timeout(), Some(Duration::from_secs(90)));
        assert!(config.strict_erase);
        assert_eq!(config.tasks, vec!["Temp files", "docker-prune"]);
        assert_eq!(config.custom_paths, vec!["~/Downloads/old"]);
        assert_eq!(config.notify.email, "me@example.com");
        assert_eq!(config.smtp.port, Some(465));
    }

    #[test]
    fn zero_timeout_disables_the_limit() {
        let config = Config::from_toml_str("command_timeout = \"0s\"").unwrap();
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml_str("frequency = \"daily\"").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tasks = [\"Trash\"]\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.tasks, vec!["Trash"]);
        assert_eq!(config.command_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn invalid_file_reports_its_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tasks = 3").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn environment_overrides_smtp_file_values() {
        let smtp = SmtpConfig {
            server: Some("file.example.com".to_string()),
            port: Some(2525),
            user: Some("file-user".to_string()),
            password: None,
        };
        let env: HashMap<&str, &str> = [("SMTP_SERVER", "env.example.com"), ("EMAIL_PASS", "pw")]
            .into_iter()
            .collect();

        let settings = smtp
            .resolve_with(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(
            settings,
            SmtpSettings {
                server: "env.example.com".to_string(),
                port: 2525,
                user: "file-user".to_string(),
                password: "pw".to_string(),
            }
        );
    }

    #[test]
    fn incomplete_smtp_resolves_to_none() {
        let smtp = SmtpConfig {
            server: Some("smtp.example.com".to_string()),
            ..SmtpConfig::default()
        };
        assert!(smtp.resolve_with(|_| None).is_none());

        let complete = SmtpConfig {
            server: Some("smtp.example.com".to_string()),
            user: Some("u".to_string()),
            password: Some("p".to_string()),
            port: None,
        };
        assert_eq!(complete.resolve_with(|_| None).unwrap().port, 587);
    }
}
