//! Headless runner that drives a simulation and checkpoints it to disk.

mod checkpoint;
mod telemetry;

use anyhow::{Context, Result};
use checkpoint::CheckpointManager;
use petri_core::{Error, RunnerConfig};
use petri_world::{Simulation, SimulationHandle, StepStatus};
use tokio::signal;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config().await?;
    telemetry::init_telemetry(config.json_logs)?;

    info!(
        width = config.simulation.world.width,
        height = config.simulation.world.height,
        rules = config.simulation.rules.name(),
        seed = config.simulation.seed,
        "Starting petri runner"
    );

    let simulation = Simulation::new(config.simulation.clone(), &config.seed_pattern)?;
    let handle = SimulationHandle::new(simulation);
    let checkpoints = config.checkpoint_dir.as_deref().map(CheckpointManager::new);

    if let Some(manager) = checkpoints.as_ref().filter(|_| config.restore_latest) {
        match manager.restore_latest().await {
            Ok(checkpoint) => handle.restore(checkpoint.snapshot)?,
            Err(Error::NotFound(_)) => info!("No checkpoint in {:?}, starting fresh", manager.dir()),
            Err(e) => warn!("Ignoring unreadable checkpoint: {}", e),
        }
    }

    let mut ticker = pacer(config.tick_interval_ms);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let generation = handle.generation();
        if config.max_generations.map_or(false, |max| generation >= max) {
            info!(generation = generation, "Reached generation limit");
            break;
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = pace(ticker.as_mut()) => {}
        }

        let driver = handle.clone();
        let mut step = tokio::task::spawn_blocking(move || driver.step());

        let result = tokio::select! {
            _ = &mut shutdown => {
                handle.cancel_step();
                let _ = (&mut step).await;
                break;
            }
            result = &mut step => result.context("Step task panicked")?,
        };

        match result {
            Ok(StepStatus::Advanced(summary)) => {
                if config.checkpoint_interval > 0
                    && summary.generation % config.checkpoint_interval == 0
                {
                    if let Some(manager) = &checkpoints {
                        write_checkpoint(manager, &handle, config.keep_checkpoints).await;
                    }
                }
            }
            Ok(StepStatus::Halted) => debug!("Simulation halted, skipping tick"),
            Err(Error::Cancelled) => break,
            Err(e) => return Err(e.into()),
        }
    }

    info!("Shutting down runner");
    if let Some(manager) = &checkpoints {
        write_checkpoint(manager, &handle, config.keep_checkpoints).await;
    }

    let census = handle.census();
    info!(
        generation = handle.generation(),
        population = census.population,
        lineages = census.lineage_count(),
        "Final population"
    );

    Ok(())
}

/// Configuration from the path in the first argument or `PETRI_CONFIG`,
/// falling back to defaults.
async fn load_config() -> Result<RunnerConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PETRI_CONFIG").ok());

    let Some(path) = path else {
        return Ok(RunnerConfig::default());
    };

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config {}", path))?;
    let config: RunnerConfig =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse config {}", path))?;
    Ok(config)
}

fn pacer(tick_interval_ms: u64) -> Option<Interval> {
    (tick_interval_ms > 0).then(|| {
        let mut ticker = interval(Duration::from_millis(tick_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    })
}

async fn pace(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => tokio::task::yield_now().await,
    }
}

async fn write_checkpoint(manager: &CheckpointManager, handle: &SimulationHandle, keep: usize) {
    let snapshot = handle.snapshot();
    if let Err(e) = manager.create_checkpoint(&snapshot).await {
        warn!("Failed to create checkpoint: {}", e);
        return;
    }
    if let Err(e) = manager.cleanup_old_checkpoints(keep).await {
        warn!("Failed to clean up checkpoints: {}", e);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
