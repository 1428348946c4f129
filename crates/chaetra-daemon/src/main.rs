//! chaetra-daemon - hosts the chaetra engine and its tier sweeper.
//!
//! Restores state from the snapshot database, optionally replays a JSON
//! Lines file of observations, sweeps on a schedule, and writes a final
//! snapshot on shutdown.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chaetra_core::persistence::import_jsonl;
use chaetra_core::{BackgroundRuntime, Chaetra, Observation, RuntimeConfig};
use tokio::io::BufReader;
use tokio::signal;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const REPLAY_BATCH_SIZE: usize = 100;

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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
}

/// Feed every observation in a JSON Lines file through the engine.
async fn replay_observations(engine: Arc<Chaetra>, path: &Path) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening replay file {}", path.display()))?;

    let stats = import_jsonl(
        BufReader::new(file),
        REPLAY_BATCH_SIZE,
        |batch: Vec<Observation>| {
            let engine = engine.clone();
            async move {
                let mut accepted = 0;
                for observation in batch {
                    match engine.observe_with(observation).await {
                        Ok(_) => accepted += 1,
                        Err(e) => warn!(error = %e, "Replayed observation rejected"),
                    }
                }
                Ok(accepted)
            }
        },
    )
    .await?;

    info!(
        total = stats.total,
        imported = stats.imported,
        skipped = stats.skipped,
        errors = stats.errors.len(),
        "Replay complete"
    );
    for e in &stats.errors {
        debug!(error = %e, "Replay line error");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("chaetra_core=debug".parse()?)
                .add_directive("chaetra_daemon=debug".parse()?),
        )
        .init();

    let config = RuntimeConfig::from_env().context("loading configuration")?;
    if let Some(ref path) = config.snapshot_db_path {
        info!(path = %path.display(), "Using snapshot database");
    }

    let mut runtime = BackgroundRuntime::new(config).await?;
    let engine = runtime.engine();

    if let Ok(path) = std::env::var("CHAETRA_REPLAY_PATH") {
        replay_observations(engine.clone(), Path::new(&path)).await?;
    }

    if let Some(mut events) = engine.subscribe() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!(event = event.event_type(), item_id = ?event.item_id(), "Knowledge event");
            }
        });
    }

    runtime.start().await?;
    info!("chaetra-daemon running");

    shutdown_signal().await;
    info!("Shutdown signal received, stopping sweeper...");

    let stats = runtime.shutdown().await?;
    info!(
        items = stats.items,
        opinion_history = stats.opinion_history,
        "Daemon stopped cleanly"
    );
    Ok(())
}
