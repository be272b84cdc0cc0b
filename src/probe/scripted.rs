//! Scripted executor for tests.
//!
//! Records every invocation and answers with a preset outcome per program,
//! without spawning anything.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CommandLine, ExecError, Executor};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub at: Instant,
}

/// Test double that records commands and returns pre-configured outcomes.
///
/// Programs without a configured outcome succeed immediately.
pub struct ScriptedExecutor {
    failing: Vec<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            failing: Vec::new(),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make every invocation of `program` fail.
    pub fn fail(mut self, program: &str) -> Self {
        self.failing.push(program.to_string());
        self
    }

    /// Make every invocation of `program` take `delay` before answering.
    pub fn delay(mut self, program: &str, delay: Duration) -> Self {
        self.delays.insert(program.to_string(), delay);
        self
    }

    /// Invocations of `program`, in call order.
    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, command: &CommandLine, timeout: Option<Duration>) -> Result<(), ExecError> {
        self.calls.lock().unwrap().push(Invocation {
            program: command.program().to_string(),
            at: Instant::now(),
        });

        if let Some(delay) = self.delays.get(command.program()) {
            match timeout {
                Some(limit) if limit < *delay => {
                    tokio::time::sleep(limit).await;
                    return Err(ExecError::Timeout(limit));
                }
                _ => tokio::time::sleep(*delay).await,
            }
        }

        if self.failing.iter().any(|p| p == command.program()) {
            Err(ExecError::Exit(Some(1)))
        } else {
            Ok(())
        }
    }
}
