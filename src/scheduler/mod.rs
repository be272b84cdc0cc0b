//! Scheduler module for running watchers and routing their results.

mod nodata;
mod server;

pub use nodata::*;
pub use server::*;

use crate::clock::Clock;
use crate::probe::Executor;
use crate::state::{ProbeResult, TargetSpec};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinSet;

/// Capacity of the shared result channel.
pub const RESULT_CHANNEL_CAPACITY: usize = 1000;

/// Scheduler error types.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("result channel closed")]
    ChannelClosed,
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

/// Resolves once shutdown has been requested (or the sender is gone).
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// The main scheduler that wires watchers, the no-data ticker and the server.
pub struct Scheduler {
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Sender<bool>,
    stop_chans: Arc<RwLock<HashMap<String, broadcast::Sender<()>>>>,
}

impl Scheduler {
    pub fn new(executor: Arc<dyn Executor>, clock: Arc<dyn Clock>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            executor,
            clock,
            shutdown,
            stop_chans: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Ask every task to stop. In-flight commands run to completion.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Monitor `targets` until shutdown or until a critical task ends.
    ///
    /// The server and the no-data ticker are critical: whichever finishes
    /// first brings the rest down. Watchers are not; a stopped watcher is
    /// covered by the no-data ticker.
    pub async fn run(&self, targets: Vec<TargetSpec>) -> Result<(), SchedulerError> {
        tracing::info!("Scheduler: Starting with {} targets", targets.len());

        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        let server = Server::new(&targets, rx, self.executor.clone(), self.clock.clone());
        let names = targets.iter().map(|t| t.name.clone()).collect();
        let ticker = NoDataTicker::new(names, tx.clone());

        let mut critical = JoinSet::new();
        critical.spawn(server.run(self.shutdown.subscribe()));
        critical.spawn(ticker.run(self.shutdown.subscribe()));

        for target in targets {
            self.add_watcher(target, tx.clone()).await;
        }
        drop(tx);

        let first = critical.join_next().await;
        let requested = *self.shutdown.borrow();
        self.shutdown();

        while let Some(rest) = critical.join_next().await {
            if let Ok(Err(e)) = rest {
                tracing::debug!("Scheduler: Task ended during shutdown: {}", e);
            }
        }

        match first {
            _ if requested => {
                tracing::info!("Scheduler: Stopped");
                Ok(())
            }
            Some(Ok(Ok(()))) | None => Ok(()),
            Some(Ok(Err(e))) => Err(e),
            Some(Err(e)) => Err(SchedulerError::TaskPanicked(e.to_string())),
        }
    }

    /// Start a watcher for one target.
    async fn add_watcher(&self, spec: TargetSpec, tx: mpsc::Sender<ProbeResult>) {
        let mut stop_chans = self.stop_chans.write().await;

        if stop_chans.contains_key(&spec.name) {
            return; // Already running
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        stop_chans.insert(spec.name.clone(), stop_tx);
        drop(stop_chans);

        tracing::info!(
            "Scheduler: Adding watcher for {} every {:?}: {}",
            spec.name,
            spec.interval,
            spec.watch_cmd
        );

        let name = spec.name.clone();
        let watcher = Watcher {
            spec,
            tx,
            executor: self.executor.clone(),
            clock: self.clock.clone(),
        };
        let shutdown = self.shutdown.subscribe();
        let stop_chans = self.stop_chans.clone();

        tokio::spawn(async move {
            let handle = tokio::spawn(watcher.run(stop_rx, shutdown));
            if let Err(e) = handle.await {
                tracing::error!("Scheduler: Watcher for {} crashed: {}", name, e);
            }

            // Clean up when done
            let mut chans = stop_chans.write().await;
            chans.remove(&name);
        });
    }

    /// Stop the watcher for `name`. Its target stays registered with the
    /// server, so no-data evaluation continues.
    pub async fn stop_watcher(&self, name: &str) -> bool {
        let mut stop_chans = self.stop_chans.write().await;

        match stop_chans.remove(name) {
            Some(stop_tx) => {
                let _ = stop_tx.send(());
                tracing::info!("Scheduler: Stopped watcher for {}", name);
                true
            }
            None => false,
        }
    }
}

/// Periodic prober for a single target.
struct Watcher {
    spec: TargetSpec,
    tx: mpsc::Sender<ProbeResult>,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
}

impl Watcher {
    async fn run(self, mut stop_rx: broadcast::Receiver<()>, mut shutdown: watch::Receiver<bool>) {
        // Add jitter to avoid thundering herd
        let jitter = Duration::from_millis(rand::random::<u64>() % 100);
        let start = tokio::time::Instant::now() + jitter;

        let mut interval = tokio::time::interval_at(start, self.spec.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = stop_rx.recv() => break,
                _ = interval.tick() => self.launch_probe(),
            }
        }

        tracing::debug!("Watcher: {} stopped scheduling probes", self.spec.name);
    }

    /// Probe in the background; the probe may outlive the tick.
    fn launch_probe(&self) {
        let executor = self.executor.clone();
        let clock = self.clock.clone();
        let tx = self.tx.clone();
        let name = self.spec.name.clone();
        let command = self.spec.watch_cmd.clone();
        let timeout = self.spec.timeout;

        tokio::spawn(async move {
            let started = clock.now();
            let outcome = executor.execute(&command, Some(timeout)).await;

            if let Err(e) = &outcome {
                tracing::debug!("Watcher: Probe for {} failed: {}", name, e);
            }

            let result = ProbeResult {
                name,
                succeeded: outcome.is_ok(),
                timestamp: started,
            };

            if let Err(e) = tx.send(result).await {
                tracing::warn!("Watcher: Failed to send result for {}", e.0.name);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::PausedClock;
    use crate::probe::{CommandLine, ScriptedExecutor};
    use tokio::task::JoinHandle;
    use tokio::time::Instant;

    fn cmd(program: &str) -> CommandLine {
        CommandLine::from_argv(&[program.to_string()]).unwrap()
    }

    fn spec(name: &str, interval: Duration, threshold: Duration) -> TargetSpec {
        TargetSpec {
            name: name.to_string(),
            interval,
            threshold,
            timeout: Duration::from_secs(5),
            watch_cmd: cmd("probe"),
            alert_cmd: Some(cmd("alert")),
            no_data_cmd: Some(cmd("nodata")),
        }
    }

    fn start(
        executor: &Arc<ScriptedExecutor>,
        targets: Vec<TargetSpec>,
    ) -> (Arc<Scheduler>, JoinHandle<Result<(), SchedulerError>>) {
        let scheduler = Arc::new(Scheduler::new(executor.clone(), Arc::new(PausedClock::new())));
        let runner = scheduler.clone();
        let handle = tokio::spawn(async move { runner.run(targets).await });
        (scheduler, handle)
    }

    async fn stop(scheduler: &Scheduler, handle: JoinHandle<Result<(), SchedulerError>>) {
        scheduler.shutdown();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_target_never_fires() {
        let executor = Arc::new(ScriptedExecutor::new());
        let target = spec("web", Duration::from_secs(1), Duration::from_secs(3));
        let (scheduler, handle) = start(&executor, vec![target]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        stop(&scheduler, handle).await;

        assert!(executor.calls_to("probe").len() >= 9);
        assert!(executor.calls_to("alert").is_empty());
        assert!(executor.calls_to("nodata").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_target_alerts_repeatedly() {
        let executor = Arc::new(ScriptedExecutor::new().fail("probe"));
        let mut target = spec("web", Duration::from_secs(1), Duration::from_secs(2));
        target.no_data_cmd = None;
        let began = Instant::now();
        let (scheduler, handle) = start(&executor, vec![target]);

        tokio::time::sleep(Duration::from_secs(6)).await;
        stop(&scheduler, handle).await;

        let alerts = executor.calls_to("alert");
        assert!(alerts.len() >= 2, "expected repeated alerts, got {}", alerts.len());
        let first = alerts[0].at - began;
        assert!(first >= Duration::from_secs(2), "alert fired early at {:?}", first);
        assert!(first <= Duration::from_millis(3100), "alert fired late at {:?}", first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_watcher_triggers_no_data() {
        let executor = Arc::new(ScriptedExecutor::new());
        let target = spec("web", Duration::from_secs(1), Duration::from_secs(2));
        let began = Instant::now();
        let (scheduler, handle) = start(&executor, vec![target]);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(scheduler.stop_watcher("web").await);
        let probes_at_stop = executor.calls_to("probe").len();

        tokio::time::sleep(Duration::from_millis(4500)).await;
        stop(&scheduler, handle).await;

        assert_eq!(executor.calls_to("probe").len(), probes_at_stop);

        let no_data = executor.calls_to("nodata");
        assert!(!no_data.is_empty());
        let first = no_data[0].at - began;
        assert!(first >= Duration::from_secs(3), "no-data fired early at {:?}", first);
        assert!(first <= Duration::from_millis(4500), "no-data fired late at {:?}", first);

        // Both conditions were true; no-data wins every time.
        assert!(executor.calls_to("alert").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probes_overlap() {
        let executor = Arc::new(ScriptedExecutor::new().delay("probe", Duration::from_millis(2500)));
        let target = spec("web", Duration::from_secs(1), Duration::from_secs(5));
        let (scheduler, handle) = start(&executor, vec![target]);

        tokio::time::sleep(Duration::from_secs(8)).await;
        stop(&scheduler, handle).await;

        assert!(executor.calls_to("probe").len() >= 7);
        assert!(executor.calls_to("alert").is_empty());
        assert!(executor.calls_to("nodata").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_targets_are_independent() {
        let executor = Arc::new(ScriptedExecutor::new().fail("broken-probe"));
        let healthy = spec("healthy", Duration::from_secs(1), Duration::from_secs(2));
        let mut broken = spec("broken", Duration::from_secs(1), Duration::from_secs(2));
        broken.watch_cmd = cmd("broken-probe");
        broken.alert_cmd = Some(cmd("broken-alert"));
        broken.no_data_cmd = None;
        let (scheduler, handle) = start(&executor, vec![healthy, broken]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        stop(&scheduler, handle).await;

        assert!(!executor.calls_to("broken-alert").is_empty());
        assert!(executor.calls_to("alert").is_empty());
        assert!(executor.calls_to("nodata").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_watchers() {
        let executor = Arc::new(ScriptedExecutor::new());
        let target = spec("web", Duration::from_secs(1), Duration::from_secs(3));
        let (scheduler, handle) = start(&executor, vec![target]);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        stop(&scheduler, handle).await;
        let probes = executor.calls_to("probe").len();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(executor.calls_to("probe").len(), probes);
        assert!(!scheduler.stop_watcher("web").await);
    }

    #[tokio::test]
    async fn test_stop_unknown_watcher() {
        let scheduler = Scheduler::new(
            Arc::new(ScriptedExecutor::new()),
            Arc::new(PausedClock::new()),
        );
        assert!(!scheduler.stop_watcher("nope").await);
    }
}
