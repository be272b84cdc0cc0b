//! Target collection owned by the server.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use super::models::*;
use crate::probe::CommandLine;

/// State error types.
#[derive(Error, Debug, PartialEq)]
pub enum StateError {
    #[error("unknown target: {0}")]
    UnknownTarget(String),
}

/// A command the server decided to fire.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub target: String,
    pub verdict: Verdict,
    pub command: CommandLine,
    pub timeout: Duration,
}

/// All registered targets, keyed by name.
///
/// Not shared: exactly one owner applies results, so no locking.
#[derive(Debug, Default)]
pub struct TargetSet {
    targets: HashMap<String, Target>,
}

impl TargetSet {
    /// Register every spec at `registered_at`.
    pub fn new(specs: &[TargetSpec], registered_at: DateTime<Utc>) -> Self {
        let targets = specs
            .iter()
            .map(|spec| (spec.name.clone(), Target::new(spec, registered_at)))
            .collect();
        Self { targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    /// Apply a result and evaluate its target at `now`.
    pub fn apply(&mut self, result: &ProbeResult, now: DateTime<Utc>) -> Result<Option<Dispatch>, StateError> {
        let target = self
            .targets
            .get_mut(&result.name)
            .ok_or_else(|| StateError::UnknownTarget(result.name.clone()))?;

        target.record(result);

        let dispatch = target.evaluate(now).and_then(|verdict| {
            target.command_for(verdict).map(|command| Dispatch {
                target: target.name.clone(),
                verdict,
                command: command.clone(),
                timeout: target.timeout,
            })
        });

        Ok(dispatch)
    }
}
