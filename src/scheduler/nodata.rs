//! No-data ticker that keeps stalled targets evaluated.

use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::{shutdown_requested, SchedulerError};
use crate::state::ProbeResult;

/// Period of the global no-data sweep.
pub const NO_DATA_TICK: Duration = Duration::from_secs(1);

/// Injects a synthetic result for every target once per tick, so the server
/// re-evaluates targets whose watcher has gone quiet.
pub struct NoDataTicker {
    names: Vec<String>,
    tx: mpsc::Sender<ProbeResult>,
    period: Duration,
}

impl NoDataTicker {
    pub fn new(names: Vec<String>, tx: mpsc::Sender<ProbeResult>) -> Self {
        Self {
            names,
            tx,
            period: NO_DATA_TICK,
        }
    }

    /// Tick until shutdown. Fails if the server has gone away.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), SchedulerError> {
        let mut interval = tokio::time::interval(self.period);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => return Ok(()),
                _ = interval.tick() => {}
            }

            for name in &self.names {
                if self.tx.send(ProbeResult::no_data(name)).await.is_err() {
                    tracing::error!("NoDataTicker: Result channel closed");
                    return Err(SchedulerError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sends_one_synthetic_result_per_target_per_tick() {
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = NoDataTicker::new(vec!["a".to_string(), "b".to_string()], tx);
        let handle = tokio::spawn(ticker.run(shutdown_rx));

        // Ticks at 0s, 1s and 2s.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown_tx.send_replace(true);
        assert!(handle.await.unwrap().is_ok());

        let mut received = Vec::new();
        while let Ok(result) = rx.try_recv() {
            received.push(result);
        }
        assert_eq!(received.len(), 6);
        assert!(received.iter().all(|r| !r.succeeded));
        assert!(received.iter().all(|r| *r == ProbeResult::no_data(&r.name)));
        assert_eq!(received.iter().filter(|r| r.name == "a").count(), 3);
    }

    #[tokio::test]
    async fn test_fails_when_server_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = NoDataTicker::new(vec!["a".to_string()], tx);
        let result = ticker.run(shutdown_rx).await;
        assert!(matches!(result, Err(SchedulerError::ChannelClosed)));
    }
}
