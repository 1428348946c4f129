//! Periodic scheduler for tier sweeps.
//!
//! Uses tokio-cron-scheduler to run [`TierSweeper::sweep`] at a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};

use super::sweep::{SweepReport, TierSweeper};
use crate::config::LearningConfig;
use crate::error::ChaetraResult;

/// Configuration for the sweep scheduler.
#[derive(Debug, Clone)]
pub struct SweepSchedulerConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Whether to sweep once immediately on start (default: false).
    pub run_on_start: bool,
}

impl Default for SweepSchedulerConfig {
    fn default() -> Self {
        Self::from_learning(&LearningConfig::default())
    }
}

impl SweepSchedulerConfig {
    /// Interval taken from `sweep_interval_seconds`.
    pub fn from_learning(config: &LearningConfig) -> Self {
        Self {
            interval: config.sweep_interval(),
            run_on_start: false,
        }
    }

    /// Create config with a custom interval, at least one second.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_secs(1)),
            run_on_start: false,
        }
    }

    /// Enable an immediate sweep on start.
    pub fn with_run_on_start(mut self) -> Self {
        self.run_on_start = true;
        self
    }
}

/// Runs sweeps in the background.
///
/// Call `start()` to begin periodic execution. `shutdown()` stops the
/// sweeper between items and tears the job scheduler down.
pub struct SweepScheduler {
    scheduler: JobScheduler,
    sweeper: Arc<TierSweeper>,
    config: SweepSchedulerConfig,
}

impl SweepScheduler {
    pub async fn new(sweeper: Arc<TierSweeper>, config: SweepSchedulerConfig) -> ChaetraResult<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            sweeper,
            config,
        })
    }

    pub fn config(&self) -> &SweepSchedulerConfig {
        &self.config
    }

    /// Start periodic sweeps.
    pub async fn start(&self) -> ChaetraResult<()> {
        let sweeper = self.sweeper.clone();

        let job = Job::new_repeated_async(self.config.interval, move |_uuid, _lock| {
            let sweeper = sweeper.clone();
            Box::pin(async move {
                debug!("Starting periodic sweep");
                let report = sweeper.sweep().await;
                if !report.errors.is_empty() {
                    warn!(errors = report.errors.len(), "Sweep finished with item errors");
                }
            })
        })?;

        self.scheduler.add(job).await?;

        if self.config.run_on_start {
            debug!("Running initial sweep on start");
            self.sweeper.sweep().await;
        }

        self.scheduler.start().await?;

        info!(
            interval_secs = self.config.interval.as_secs(),
            "Sweep scheduler started"
        );
        Ok(())
    }

    /// Stop the scheduler; an in-flight tick stops after its current item.
    pub async fn shutdown(&mut self) -> ChaetraResult<()> {
        info!("Shutting down sweep scheduler");
        self.sweeper.stop();
        self.scheduler.shutdown().await?;
        Ok(())
    }

    /// Sweep now, outside the schedule.
    pub async fn run_now(&self) -> SweepReport {
        self.sweeper.sweep().await
    }

    pub fn sweeper(&self) -> &Arc<TierSweeper> {
        &self.sweeper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SweepSchedulerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert!(!config.run_on_start);
    }

    #[test]
    fn test_scheduler_config_with_interval() {
        let config = SweepSchedulerConfig::with_interval(Duration::from_secs(30)).with_run_on_start();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert!(config.run_on_start);

        let clamped = SweepSchedulerConfig::with_interval(Duration::ZERO);
        assert_eq!(clamped.interval, Duration::from_secs(1));
    }
}
