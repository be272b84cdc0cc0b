//! locdog - local health watchdog.
//!
//! Runs user-defined watch commands on a schedule and fires alert or
//! no-data commands when a target stays unhealthy or silent for too long.

mod clock;
mod config;
mod probe;
mod scheduler;
mod state;

use clock::SystemClock;
use config::{EnvConfig, WatchdogConfig};
use probe::ProcessExecutor;
use scheduler::Scheduler;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        tracing::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("locdog=info".parse()?))
        .init();

    // Load configuration
    let env_cfg = EnvConfig::load()?;
    tracing::info!("Loading configuration from {}", env_cfg.config_path.display());

    let targets = WatchdogConfig::from_file(&env_cfg.config_path)?.resolve()?;
    if targets.is_empty() {
        tracing::warn!("No targets configured, only waiting for shutdown");
    }
    for target in &targets {
        tracing::info!(
            "Target {}: interval={:?} threshold={:?} timeout={:?} alert={} no_data={}",
            target.name,
            target.interval,
            target.threshold,
            target.timeout,
            target.alert_cmd.as_ref().map_or_else(|| "-".to_string(), |c| c.to_string()),
            target.no_data_cmd.as_ref().map_or_else(|| "-".to_string(), |c| c.to_string()),
        );
    }

    let scheduler = Arc::new(Scheduler::new(Arc::new(ProcessExecutor), Arc::new(SystemClock)));

    // Stop on Ctrl-C or SIGTERM
    let signal_scheduler = scheduler.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_scheduler.shutdown();
    });

    scheduler.run(targets).await?;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
