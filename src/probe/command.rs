//! Command executor backed by child processes.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{CommandLine, ExecError, Executor};

/// Executor that spawns the command as a child process.
///
/// Output is discarded; only the exit status matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, command: &CommandLine, timeout: Option<Duration>) -> Result<(), ExecError> {
        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Spawn {
                program: command.program().to_string(),
                source: e,
            })?;

        let status = match timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(status) => status?,
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            tracing::debug!("Failed to kill timed out command {}: {}", command, e);
                        }
                        return Err(ExecError::Timeout(limit));
                    }
                }
            }
            None => child.wait().await?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(ExecError::Exit(status.code()))
        }
    }
}
