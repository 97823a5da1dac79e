//! Background maintenance of the job registry.
//!
//! Periodically prunes finished jobs past their retention period and writes
//! state checkpoints.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, Interval, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatcher::Dispatcher;
use crate::config::JobsConfig;

/// Configuration for the maintenance task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceConfig {
    /// Finished jobs older than this are pruned. 0 keeps everything.
    pub job_retention_hours: u64,

    /// Period of state checkpoints. 0 disables them.
    pub checkpoint_interval_secs: u64,

    /// Period of prune runs.
    pub prune_interval_secs: u64,
}

fn default_prune_interval_secs() -> u64 {
    3600
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for MaintenanceConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            job_retention_hours: config.job_retention_hours,
            checkpoint_interval_secs: config.checkpoint_interval_secs,
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

impl MaintenanceConfig {
    pub fn with_job_retention_hours(mut self, hours: u64) -> Self {
        self.job_retention_hours = hours;
        self
    }

    pub fn with_checkpoint_interval_secs(mut self, secs: u64) -> Self {
        self.checkpoint_interval_secs = secs;
        self
    }

    pub fn with_prune_interval_secs(mut self, secs: u64) -> Self {
        self.prune_interval_secs = secs;
        self
    }
}

/// Prune once. Returns the number of removed jobs.
pub fn run_prune(dispatcher: &Dispatcher, config: &MaintenanceConfig) -> usize {
    if config.job_retention_hours == 0 {
        debug!("Job pruning disabled (job_retention_hours = 0)");
        return 0;
    }
    let retention = i64::try_from(config.job_retention_hours).unwrap_or(i64::MAX / 3600);
    dispatcher.prune_old_jobs(chrono::Duration::hours(retention))
}

fn periodic(secs: u64) -> Option<Interval> {
    (secs > 0).then(|| {
        let period = Duration::from_secs(secs);
        interval_at(Instant::now() + period, period)
    })
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Spawn the maintenance loop.
pub fn spawn_maintenance(
    dispatcher: Arc<Dispatcher>,
    config: MaintenanceConfig,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut prune_timer = periodic(config.prune_interval_secs);
        let mut checkpoint_timer = periodic(config.checkpoint_interval_secs);

        info!(
            retention_hours = config.job_retention_hours,
            checkpoint_secs = config.checkpoint_interval_secs,
            "Job maintenance started"
        );

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("Job maintenance shutting down");
                    break;
                }
                _ = tick(&mut prune_timer) => {
                    run_prune(&dispatcher, &config);
                }
                _ = tick(&mut checkpoint_timer) => {
                    if let Err(e) = dispatcher.checkpoint().await {
                        warn!(error = %e, "Job state checkpoint failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maintenance_config_from_jobs_config() {
        let config = MaintenanceConfig::from(
            &JobsConfig::default()
                .with_job_retention_hours(24)
                .with_checkpoint_interval_secs(0),
        );
        assert_eq!(config.job_retention_hours, 24);
        assert_eq!(config.checkpoint_interval_secs, 0);
        assert_eq!(config.prune_interval_secs, 3600);
    }

    #[test]
    fn test_maintenance_config_builder() {
        let config = MaintenanceConfig::default()
            .with_job_retention_hours(1)
            .with_checkpoint_interval_secs(5)
            .with_prune_interval_secs(10);
        assert_eq!(config.job_retention_hours, 1);
        assert_eq!(config.checkpoint_interval_secs, 5);
        assert_eq!(config.prune_interval_secs, 10);
    }

    #[test]
    fn test_zero_interval_is_disabled() {
        assert!(periodic(0).is_none());
    }
}
