//! Configuration module for locdog.
//!
//! The location of the config document comes from the environment; the
//! document itself is JSON.

use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::probe::CommandLine;
use crate::state::TargetSpec;

/// Built-in probe interval when neither the target nor the defaults set one.
pub const FALLBACK_INTERVAL_SECS: f64 = 60.0;
/// Built-in alert threshold.
pub const FALLBACK_THRESHOLD_SECS: f64 = 300.0;
/// Built-in command timeout.
pub const FALLBACK_TIMEOUT_SECS: f64 = 10.0;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    NoHomeDir,
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Path to the JSON config document.
    pub config_path: PathBuf,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `LOCDOG_CONFIG`: config document path (default: `~/.config/locdog/config.json`)
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var("LOCDOG_CONFIG") {
            if !path.is_empty() {
                return Ok(Self {
                    config_path: PathBuf::from(path),
                });
            }
        }

        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self {
            config_path: default_config_path(&home),
        })
    }
}

fn default_config_path(home: &Path) -> PathBuf {
    home.join(".config").join("locdog").join("config.json")
}

/// Per-target entry of the config document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interval: Option<f64>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub alert_cmd: Option<Vec<String>>,
    #[serde(default)]
    pub no_data_cmd: Option<Vec<String>>,
    #[serde(default)]
    pub watch_cmd: Vec<String>,
}

/// The config document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default)]
    pub default_interval: Option<f64>,
    #[serde(default)]
    pub default_threshold: Option<f64>,
    #[serde(default)]
    pub default_timeout: Option<f64>,
    #[serde(default)]
    pub default_alert_cmd: Option<Vec<String>>,
    #[serde(default)]
    pub default_no_data_cmd: Option<Vec<String>>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl WatchdogConfig {
    /// Read and parse the document at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Fill every unset field: targets from the defaults, defaults from the
    /// built-in fallbacks. Zero durations and empty commands count as unset.
    pub fn fill_defaults(&mut self) {
        self.default_interval = Some(or_fallback(self.default_interval, FALLBACK_INTERVAL_SECS));
        self.default_threshold = Some(or_fallback(self.default_threshold, FALLBACK_THRESHOLD_SECS));
        self.default_timeout = Some(or_fallback(self.default_timeout, FALLBACK_TIMEOUT_SECS));
        self.default_alert_cmd = non_empty(self.default_alert_cmd.take());
        self.default_no_data_cmd = non_empty(self.default_no_data_cmd.take());

        let alert_cmd = &self.default_alert_cmd;
        let no_data_cmd = &self.default_no_data_cmd;
        for target in &mut self.targets {
            target.interval = is_set(target.interval).or(self.default_interval);
            target.threshold = is_set(target.threshold).or(self.default_threshold);
            target.timeout = is_set(target.timeout).or(self.default_timeout);
            target.alert_cmd = non_empty(target.alert_cmd.take()).or_else(|| alert_cmd.clone());
            target.no_data_cmd = non_empty(target.no_data_cmd.take()).or_else(|| no_data_cmd.clone());
        }
    }

    /// Validate and produce the effective per-target configuration.
    pub fn resolve(&self) -> Result<Vec<TargetSpec>, ConfigError> {
        let mut filled = self.clone();
        filled.fill_defaults();

        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(filled.targets.len());

        for (i, target) in filled.targets.iter().enumerate() {
            if target.name.is_empty() {
                return Err(ConfigError::Invalid(format!("target #{} has no name", i)));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate target name: {}", target.name)));
            }

            let watch_cmd = CommandLine::from_argv(&target.watch_cmd).ok_or_else(|| {
                ConfigError::Invalid(format!("target {} has an empty watch_cmd", target.name))
            })?;

            specs.push(TargetSpec {
                name: target.name.clone(),
                interval: seconds(&target.name, "interval", target.interval)?,
                threshold: seconds(&target.name, "threshold", target.threshold)?,
                timeout: seconds(&target.name, "timeout", target.timeout)?,
                watch_cmd,
                alert_cmd: target.alert_cmd.as_deref().and_then(CommandLine::from_argv),
                no_data_cmd: target.no_data_cmd.as_deref().and_then(CommandLine::from_argv),
            });
        }

        Ok(specs)
    }
}

fn is_set(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

fn or_fallback(value: Option<f64>, fallback: f64) -> f64 {
    is_set(value).unwrap_or(fallback)
}

fn non_empty(cmd: Option<Vec<String>>) -> Option<Vec<String>> {
    cmd.filter(|argv| !argv.is_empty())
}

fn seconds(target: &str, field: &str, value: Option<f64>) -> Result<Duration, ConfigError> {
    let secs = value.unwrap_or_default();
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "target {}: {} must be a positive number of seconds, got {}",
            target, field, secs
        )));
    }
    let duration = Duration::try_from_secs_f64(secs)
        .map_err(|e| ConfigError::Invalid(format!("target {}: {} out of range: {}", target, field, e)))?;
    if duration.is_zero() {
        return Err(ConfigError::Invalid(format!(
            "target {}: {} rounds to zero, got {}",
            target, field, secs
        )));
    }
    Ok(duration)
}
