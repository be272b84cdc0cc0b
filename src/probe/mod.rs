//! Probe module for running external commands.
//!
//! Watch, alert and no-data commands all go through the [`Executor`] trait,
//! so the scheduling logic never spawns processes directly.

mod command;
#[cfg(test)]
mod scripted;

pub use command::*;
#[cfg(test)]
pub use scripted::*;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Command execution error types.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for command: {0}")]
    Wait(#[from] std::io::Error),
    #[error("command exited with status {}", describe_exit(.0))]
    Exit(Option<i32>),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Build a command line from an argv-style vector.
    ///
    /// Returns `None` for an empty vector or an empty program name.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs a command and reports whether it succeeded.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `command`, bounded by `timeout` when one is given.
    async fn execute(&self, command: &CommandLine, timeout: Option<Duration>) -> Result<(), ExecError>;
}
