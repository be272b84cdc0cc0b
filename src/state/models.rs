//! Liveness model types.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::probe::CommandLine;

/// Effective configuration for one monitored target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub name: String,
    pub interval: Duration,
    pub threshold: Duration,
    pub timeout: Duration,
    pub watch_cmd: CommandLine,
    pub alert_cmd: Option<CommandLine>,
    pub no_data_cmd: Option<CommandLine>,
}

/// The outcome of one probe attempt, real or synthetic.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub name: String,
    pub succeeded: bool,
    /// When the probe started.
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    /// Synthetic result that forces re-evaluation without touching state.
    pub fn no_data(name: &str) -> Self {
        Self {
            name: name.to_string(),
            succeeded: false,
            timestamp: DateTime::<Utc>::default(),
        }
    }
}

/// What an evaluation decided to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    NoData,
    Alert,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::NoData => "no-data",
            Verdict::Alert => "alert",
        }
    }
}

/// Liveness record for one target.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub last_success: DateTime<Utc>,
    pub last_data: DateTime<Utc>,
    pub threshold: Duration,
    pub timeout: Duration,
    pub alert_cmd: Option<CommandLine>,
    pub no_data_cmd: Option<CommandLine>,
}

impl Target {
    /// Register a target; both timestamps start at `registered_at`.
    pub fn new(spec: &TargetSpec, registered_at: DateTime<Utc>) -> Self {
        Self {
            name: spec.name.clone(),
            last_success: registered_at,
            last_data: registered_at,
            threshold: spec.threshold,
            timeout: spec.timeout,
            alert_cmd: spec.alert_cmd.clone(),
            no_data_cmd: spec.no_data_cmd.clone(),
        }
    }

    /// Apply a result. Each timestamp only ever moves forward, so results
    /// arriving out of start order never rewind state.
    ///
    /// Returns whether anything changed.
    pub fn record(&mut self, result: &ProbeResult) -> bool {
        let mut changed = false;
        if result.timestamp > self.last_data {
            self.last_data = result.timestamp;
            changed = true;
        }
        if result.succeeded && result.timestamp > self.last_success {
            self.last_success = result.timestamp;
            changed = true;
        }
        changed
    }

    /// Decide what to fire at `now`. No-data wins over alert.
    pub fn evaluate(&self, now: DateTime<Utc>) -> Option<Verdict> {
        if self.no_data_cmd.is_some() && silence(now, self.last_data) > self.threshold {
            return Some(Verdict::NoData);
        }
        if self.alert_cmd.is_some() && silence(now, self.last_success) > self.threshold {
            return Some(Verdict::Alert);
        }
        None
    }

    /// The command configured for `verdict`.
    pub fn command_for(&self, verdict: Verdict) -> Option<&CommandLine> {
        match verdict {
            Verdict::NoData => self.no_data_cmd.as_ref(),
            Verdict::Alert => self.alert_cmd.as_ref(),
        }
    }
}

/// Time since `since`, clamped at zero.
fn silence(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}
