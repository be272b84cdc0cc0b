//! Result server: the single consumer of probe results.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::{shutdown_requested, SchedulerError};
use crate::clock::Clock;
use crate::probe::Executor;
use crate::state::{Dispatch, ProbeResult, TargetSet, TargetSpec};

/// Owns every target and decides when alert and no-data commands fire.
///
/// Results are applied strictly in receive order by one task, which is what
/// keeps target state lock-free.
pub struct Server {
    targets: TargetSet,
    rx: mpsc::Receiver<ProbeResult>,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
}

impl Server {
    /// Register `specs` at the current time.
    pub fn new(
        specs: &[TargetSpec],
        rx: mpsc::Receiver<ProbeResult>,
        executor: Arc<dyn Executor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let targets = TargetSet::new(specs, clock.now());
        Self {
            targets,
            rx,
            executor,
            clock,
        }
    }

    /// Consume results until shutdown, or until every sender is gone.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SchedulerError> {
        if self.targets.is_empty() {
            tracing::warn!("Server: No targets registered");
        } else {
            tracing::info!("Server: Tracking {} targets", self.targets.len());
        }

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => {
                    tracing::info!("Server: Shutting down");
                    return Ok(());
                }
                received = self.rx.recv() => received,
            };

            match received {
                Some(result) => self.handle(result),
                None => return Err(SchedulerError::ChannelClosed),
            }
        }
    }

    fn handle(&mut self, result: ProbeResult) {
        let now = self.clock.now();
        match self.targets.apply(&result, now) {
            Ok(Some(dispatch)) => fire(self.executor.clone(), dispatch),
            Ok(None) => {}
            Err(e) => tracing::warn!("Server: Ignoring result: {}", e),
        }
    }
}

/// Run the command in the background; its outcome is only logged.
fn fire(executor: Arc<dyn Executor>, dispatch: Dispatch) {
    tracing::info!(
        "Server: Firing {} command for {}: {}",
        dispatch.verdict.label(),
        dispatch.target,
        dispatch.command
    );

    tokio::spawn(async move {
        if let Err(e) = executor.execute(&dispatch.command, Some(dispatch.timeout)).await {
            tracing::warn!(
                "Server: {} command for {} failed: {}",
                dispatch.verdict.label(),
                dispatch.target,
                e
            );
        }
    });
}
