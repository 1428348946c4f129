//! Background runtime.
//!
//! Owns the engine, its snapshot store and the sweep scheduler, providing
//! unified startup (restore, then schedule) and graceful shutdown (stop
//! sweeping, then persist).

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::LearningConfig;
use crate::engine::Chaetra;
use crate::error::{ChaetraError, ChaetraResult};
use crate::events::EventBus;
use crate::persistence::{SnapshotStore, SqliteSnapshotStore};
use crate::sweeper::{SweepScheduler, SweepSchedulerConfig};

/// Sentinel for `CHAETRA_SNAPSHOT_DB_PATH` selecting an in-memory database.
const IN_MEMORY: &str = ":memory:";

/// Configuration for the BackgroundRuntime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Learning thresholds handed to the engine.
    pub learning: LearningConfig,
    /// Path to the SQLite snapshot database (default: None = in-memory).
    pub snapshot_db_path: Option<PathBuf>,
    /// Whether to enable the sweep scheduler (default: true).
    pub enable_sweeper: bool,
    /// Whether to sweep once immediately on start (default: false).
    pub sweep_run_on_start: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            learning: LearningConfig::default(),
            snapshot_db_path: None,
            enable_sweeper: true,
            sweep_run_on_start: false,
        }
    }
}

impl RuntimeConfig {
    /// Use the given learning configuration.
    pub fn with_learning(mut self, learning: LearningConfig) -> Self {
        self.learning = learning;
        self
    }

    /// Set path for the snapshot database.
    pub fn with_snapshot_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_db_path = Some(path.into());
        self
    }

    /// Enable an immediate sweep on start.
    pub fn with_run_on_start(mut self) -> Self {
        self.sweep_run_on_start = true;
        self
    }

    /// Disable the sweep scheduler.
    pub fn without_sweeper(mut self) -> Self {
        self.enable_sweeper = false;
        self
    }

    /// Default on-disk snapshot location under the user's data directory.
    pub fn default_snapshot_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("chaetra").join("snapshot.db"))
    }

    /// Create config from environment variables.
    ///
    /// Reads:
    /// - `CHAETRA_CONFIG_PATH`: learning config file; otherwise the
    ///   `CHAETRA_*` learning variables (see [`LearningConfig::from_env`])
    /// - `CHAETRA_SNAPSHOT_DB_PATH` (default: the user data directory;
    ///   `:memory:` for an in-memory database)
    /// - `CHAETRA_SWEEP_RUN_ON_START` (default: false)
    /// - `CHAETRA_DISABLE_SWEEPER` (default: sweeper enabled)
    pub fn from_env() -> ChaetraResult<Self> {
        let learning = match std::env::var("CHAETRA_CONFIG_PATH") {
            Ok(path) => LearningConfig::from_file(path)?,
            Err(_) => LearningConfig::from_env()?,
        };

        let snapshot_db_path = match std::env::var("CHAETRA_SNAPSHOT_DB_PATH") {
            Ok(path) if path == IN_MEMORY => None,
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => Self::default_snapshot_path(),
        };

        Ok(Self {
            learning,
            snapshot_db_path,
            enable_sweeper: std::env::var("CHAETRA_DISABLE_SWEEPER").is_err(),
            sweep_run_on_start: std::env::var("CHAETRA_SWEEP_RUN_ON_START").is_ok(),
        })
    }
}

/// What a persist pass wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// Item snapshots written.
    pub items: usize,
    /// Opinion history rows appended.
    pub opinion_history: usize,
}

/// Background runtime managing the engine lifecycle.
///
/// # Example
///
/// ```ignore
/// use chaetra_core::{BackgroundRuntime, RuntimeConfig};
///
/// let mut runtime = BackgroundRuntime::new(RuntimeConfig::from_env()?).await?;
/// runtime.start().await?;
/// // ... application runs ...
/// runtime.shutdown().await?;
/// ```
pub struct BackgroundRuntime {
    engine: Arc<Chaetra>,
    snapshots: Arc<dyn SnapshotStore>,
    scheduler: Option<SweepScheduler>,
    config: RuntimeConfig,
}

impl BackgroundRuntime {
    /// Open the snapshot store, restore its contents and build the scheduler.
    ///
    /// Call `start()` to begin sweeping.
    pub async fn new(config: RuntimeConfig) -> ChaetraResult<Self> {
        let snapshots: Arc<dyn SnapshotStore> = match config.snapshot_db_path {
            Some(ref path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                debug!(path = %path.display(), "Opening file-backed snapshot store");
                Arc::new(SqliteSnapshotStore::new(path)?)
            }
            None => {
                debug!("Opening in-memory snapshot store");
                Arc::new(SqliteSnapshotStore::in_memory()?)
            }
        };
        Self::with_snapshot_store(config, snapshots).await
    }

    /// Build the runtime over an existing snapshot store.
    pub async fn with_snapshot_store(
        config: RuntimeConfig,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> ChaetraResult<Self> {
        let engine = Arc::new(Chaetra::with_events(config.learning.clone(), EventBus::new())?);

        let items = snapshots.load_items()?;
        let opinions = snapshots.load_opinions()?;
        let (restored_items, restored_opinions) = engine.restore(items, opinions)?;
        if restored_items + restored_opinions > 0 {
            info!(
                items = restored_items,
                opinions = restored_opinions,
                "Restored state from snapshot"
            );
        }

        let scheduler = if config.enable_sweeper {
            let mut scheduler_config = SweepSchedulerConfig::from_learning(&config.learning);
            scheduler_config.run_on_start = config.sweep_run_on_start;
            Some(SweepScheduler::new(engine.sweeper(), scheduler_config).await?)
        } else {
            None
        };

        Ok(Self {
            engine,
            snapshots,
            scheduler,
            config,
        })
    }

    /// Start the sweep scheduler.
    pub async fn start(&self) -> ChaetraResult<()> {
        if let Some(ref scheduler) = self.scheduler {
            scheduler.start().await?;
        }
        info!(sweeper = self.scheduler.is_some(), "Background runtime started");
        Ok(())
    }

    /// Stop sweeping, then write a final snapshot.
    pub async fn shutdown(&mut self) -> ChaetraResult<PersistStats> {
        debug!("Shutting down background runtime");
        if let Some(ref mut scheduler) = self.scheduler {
            scheduler.shutdown().await?;
            debug!("Sweep scheduler stopped");
        }
        let stats = self.persist_all()?;
        info!(
            items = stats.items,
            opinion_history = stats.opinion_history,
            "Background runtime stopped"
        );
        Ok(stats)
    }

    /// Write every item and opinion to the snapshot store.
    pub fn persist_all(&self) -> ChaetraResult<PersistStats> {
        let mut stats = PersistStats::default();
        for item in self.engine.store().all_items() {
            self.snapshots.save_item(&item).map_err(|e| {
                ChaetraError::database(format!("saving item {}: {}", item.id, e))
            })?;
            stats.items += 1;
        }
        for opinion in self.engine.list_opinions() {
            stats.opinion_history += self.snapshots.record_opinion(&opinion)?;
        }
        Ok(stats)
    }

    pub fn engine(&self) -> Arc<Chaetra> {
        self.engine.clone()
    }

    pub fn snapshot_store(&self) -> Arc<dyn SnapshotStore> {
        self.snapshots.clone()
    }

    pub fn scheduler(&self) -> Option<&SweepScheduler> {
        self.scheduler.as_ref()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MockSnapshotStore;
    use crate::types::{Evidence, Statement};

    #[test]
    fn test_runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.enable_sweeper);
        assert!(!config.sweep_run_on_start);
        assert!(config.snapshot_db_path.is_none());
        assert_eq!(config.learning, LearningConfig::default());
    }

    #[test]
    fn test_runtime_config_builder() {
        let config = RuntimeConfig::default()
            .with_run_on_start()
            .without_sweeper()
            .with_snapshot_db_path("/tmp/chaetra.db");
        assert!(config.sweep_run_on_start);
        assert!(!config.enable_sweeper);
        assert_eq!(config.snapshot_db_path, Some(PathBuf::from("/tmp/chaetra.db")));
    }

    #[tokio::test]
    async fn test_runtime_start_and_shutdown() {
        let mut runtime = BackgroundRuntime::new(RuntimeConfig::default()).await.unwrap();
        assert!(runtime.scheduler().is_some());
        runtime.start().await.unwrap();
        let stats = runtime.shutdown().await.unwrap();
        assert_eq!(stats, PersistStats::default());
    }

    #[tokio::test]
    async fn test_persist_all_writes_every_item() {
        let mut mock = MockSnapshotStore::new();
        mock.expect_load_items().times(1).returning(|| Ok(Vec::new()));
        mock.expect_load_opinions().times(1).returning(|| Ok(Vec::new()));
        mock.expect_save_item().times(2).returning(|_| Ok(()));
        mock.expect_record_opinion().never();

        let runtime = BackgroundRuntime::with_snapshot_store(
            RuntimeConfig::default().without_sweeper(),
            Arc::new(mock),
        )
        .await
        .unwrap();

        let engine = runtime.engine();
        for statement in ["a", "b"] {
            engine
                .observe("t", Statement::text(statement), "d", Evidence::supporting("feed"))
                .await
                .unwrap();
        }

        let stats = runtime.persist_all().unwrap();
        assert_eq!(stats.items, 2);
        assert_eq!(stats.opinion_history, 0);
    }

    #[tokio::test]
    async fn test_restore_failure_aborts_startup() {
        let mut mock = MockSnapshotStore::new();
        mock.expect_load_items()
            .returning(|| Err(ChaetraError::database("disk gone")));
        mock.expect_load_opinions().returning(|| Ok(Vec::new()));

        let result = BackgroundRuntime::with_snapshot_store(
            RuntimeConfig::default().without_sweeper(),
            Arc::new(mock),
        )
        .await;
        assert!(result.is_err());
    }
}
