//! Persisted configuration
//!
//! `config.json` in the XDG config directory supplies defaults for the
//! command line. Every field is optional; command-line options win.

use crate::core::error::{Error, Result};
use crate::core::traffic::DEFAULT_TARGET;
use crate::utils::get_config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the per-probe timeout
pub const MAX_PROBE_TIMEOUT_SECS: u64 = 300;

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_rules_file")]
    pub rules_file: PathBuf,
    #[serde(default = "default_report_file")]
    pub report_file: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Host that probe traffic is sent to
    #[serde(default = "default_target")]
    pub target: String,
    /// Timeout in seconds for a single hping3 run (clamped to 1-300)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules_file: default_rules_file(),
            report_file: default_report_file(),
            log_file: default_log_file(),
            target: default_target(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_rules_file() -> PathBuf {
    PathBuf::from("rules/sample_rules.json")
}

fn default_report_file() -> PathBuf {
    PathBuf::from("reports/validation_report.html")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("logs/validation.log")
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub rules_file: Option<PathBuf>,
    pub report_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub target: Option<String>,
    pub probe_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Applies command-line overrides on top of this config
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(rules_file) = overrides.rules_file {
            self.rules_file = rules_file;
        }
        if let Some(report_file) = overrides.report_file {
            self.report_file = report_file;
        }
        if let Some(log_file) = overrides.log_file {
            self.log_file = log_file;
        }
        if let Some(target) = overrides.target.filter(|t| !t.is_empty()) {
            self.target = target;
        }
        if let Some(secs) = overrides.probe_timeout_secs {
            self.probe_timeout_secs = secs;
        }
        self
    }

    /// Probe timeout, clamped to a sane range
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.clamp(1, MAX_PROBE_TIMEOUT_SECS))
    }
}

/// Loads the config from the XDG config directory, or returns default if not found.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but is not a valid config,
/// and [`Error::Io`] if it cannot be read.
pub async fn load_config() -> Result<AppConfig> {
    match get_config_dir() {
        Some(dir) => load_config_from(&dir.join("config.json")).await,
        None => Ok(AppConfig::default()),
    }
}

/// Loads the config from `path`; a missing file yields defaults.
///
/// Nothing is logged here: the config is read before logging is set up, so
/// callers report the error once the subscriber is installed.
///
/// # Errors
///
/// Returns [`Error::Config`] for malformed JSON or mistyped fields.
pub async fn load_config_from(path: &Path) -> Result<AppConfig> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AppConfig::default()),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&json).map_err(|e| Error::Config {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
