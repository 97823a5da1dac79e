//! Service configuration.
//!
//! Configuration is a JSON file (`CORPUS_JOBS_CONFIG`, default `config.json`)
//! with a few environment overrides applied on top. A missing file falls back
//! to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::notification::NotificationServiceConfig;
use crate::{Error, Result};

pub const CONFIG_PATH_ENV: &str = "CORPUS_JOBS_CONFIG";
pub const STATUS_DATA_PATH_ENV: &str = "CORPUS_JOBS_STATUS_DATA_PATH";
pub const MAX_CONCURRENT_ENV: &str = "CORPUS_JOBS_MAX_CONCURRENT";
pub const MAX_RESTARTS_ENV: &str = "CORPUS_JOBS_MAX_RESTARTS";
pub const LOG_DIR_ENV: &str = "CORPUS_JOBS_LOG_DIR";

const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Job engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsConfig {
    /// Where the job list is persisted.
    #[serde(default = "default_status_data_path")]
    pub status_data_path: PathBuf,

    /// Upper bound of concurrently running jobs. 0 means "pick a default".
    #[serde(default)]
    pub max_num_concurrent_jobs: usize,

    #[serde(default = "default_max_num_restarts")]
    pub max_num_restarts: u32,

    /// Period of state checkpoints. 0 disables them.
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,

    /// Finished jobs older than this are pruned. 0 keeps them forever.
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: u64,
}

fn default_status_data_path() -> PathBuf {
    PathBuf::from("jobs-status.json")
}

fn default_max_num_restarts() -> u32 {
    3
}

fn default_checkpoint_interval_secs() -> u64 {
    60
}

fn default_job_retention_hours() -> u64 {
    168
}

/// min(4, available parallelism)
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(DEFAULT_MAX_CONCURRENT_JOBS))
        .unwrap_or(1)
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            status_data_path: default_status_data_path(),
            max_num_concurrent_jobs: default_concurrency(),
            max_num_restarts: default_max_num_restarts(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            job_retention_hours: default_job_retention_hours(),
        }
    }
}

impl JobsConfig {
    pub fn with_status_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_data_path = path.into();
        self
    }

    pub fn with_max_num_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_num_concurrent_jobs = n;
        self
    }

    pub fn with_max_num_restarts(mut self, n: u32) -> Self {
        self.max_num_restarts = n;
        self
    }

    pub fn with_checkpoint_interval_secs(mut self, secs: u64) -> Self {
        self.checkpoint_interval_secs = secs;
        self
    }

    pub fn with_job_retention_hours(mut self, hours: u64) -> Self {
        self.job_retention_hours = hours;
        self
    }

    /// Fill in values left unspecified.
    pub fn normalize(mut self) -> Self {
        if self.max_num_concurrent_jobs == 0 {
            self.max_num_concurrent_jobs = default_concurrency();
            warn!(
                "maxNumConcurrentJobs not specified, using default {}",
                self.max_num_concurrent_jobs
            );
        }
        self
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Filter directive, e.g. `corpus_jobs=debug`. `RUST_LOG` wins if set.
    #[serde(default)]
    pub filter: Option<String>,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            filter: None,
        }
    }
}

/// Top level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(flatten)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub notification: NotificationServiceConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

impl AppConfig {
    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| Error::config(format!("invalid config file {}: {e}", path.display())))
    }

    /// Load the config file named by the environment, apply overrides.
    ///
    /// Logging is usually not initialized yet when this runs, so problems
    /// with the file are returned as a warning message instead of logged.
    pub fn load() -> Result<(Self, Option<String>)> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let (mut config, warning) = if path.exists() {
            (Self::from_file(&path)?, None)
        } else {
            (
                Self::default(),
                Some(format!(
                    "config file {} not found, using defaults",
                    path.display()
                )),
            )
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok((config, warning))
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(STATUS_DATA_PATH_ENV) {
            self.jobs.status_data_path = PathBuf::from(path);
        }
        if let Some(value) = lookup(MAX_CONCURRENT_ENV) {
            self.jobs.max_num_concurrent_jobs = parse_env(MAX_CONCURRENT_ENV, &value)?;
        }
        if let Some(value) = lookup(MAX_RESTARTS_ENV) {
            self.jobs.max_num_restarts = parse_env(MAX_RESTARTS_ENV, &value)?;
        }
        if let Some(dir) = lookup(LOG_DIR_ENV) {
            self.logging.dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key}: invalid value '{value}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_jobs_config_default() {
        let config = JobsConfig::default();
        assert_eq!(config.max_num_restarts, 3);
        assert_eq!(config.checkpoint_interval_secs, 60);
        assert_eq!(config.job_retention_hours, 168);
        assert!(config.max_num_concurrent_jobs >= 1);
        assert!(config.max_num_concurrent_jobs <= 4);
    }

    #[test]
    fn test_normalize_zero_concurrency() {
        let config = JobsConfig::default()
            .with_max_num_concurrent_jobs(0)
            .normalize();
        assert_eq!(config.max_num_concurrent_jobs, default_concurrency());

        let config = JobsConfig::default()
            .with_max_num_concurrent_jobs(7)
            .normalize();
        assert_eq!(config.max_num_concurrent_jobs, 7);
    }

    #[test]
    fn test_parse_camel_case() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "statusDataPath": "/var/lib/corpus-jobs/status.json",
                "maxNumConcurrentJobs": 2,
                "maxNumRestarts": 5,
                "notification": {
                    "enabled": true,
                    "channels": [{"type": "log"}]
                },
                "logging": {"dir": "/var/log/corpus-jobs", "filter": "corpus_jobs=debug"}
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.jobs.status_data_path,
            PathBuf::from("/var/lib/corpus-jobs/status.json")
        );
        assert_eq!(config.jobs.max_num_concurrent_jobs, 2);
        assert_eq!(config.jobs.max_num_restarts, 5);
        assert_eq!(config.jobs.checkpoint_interval_secs, 60);
        assert!(config.notification.enabled);
        assert_eq!(config.notification.channels.len(), 1);
        assert_eq!(config.logging.filter.as_deref(), Some("corpus_jobs=debug"));
    }

    #[test]
    fn test_missing_concurrency_is_zero_until_normalized() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.jobs.max_num_concurrent_jobs, 0);
        assert!(config.jobs.normalize().max_num_concurrent_jobs >= 1);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (STATUS_DATA_PATH_ENV, "/tmp/jobs.json"),
            (MAX_CONCURRENT_ENV, "8"),
            (MAX_RESTARTS_ENV, " 1 "),
            (LOG_DIR_ENV, "/tmp/logs"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.jobs.status_data_path, PathBuf::from("/tmp/jobs.json"));
        assert_eq!(config.jobs.max_num_concurrent_jobs, 8);
        assert_eq!(config.jobs.max_num_restarts, 1);
        assert_eq!(config.logging.dir, PathBuf::from("/tmp/logs"));
    }

    #[test]
    fn test_env_override_invalid_number() {
        let mut config = AppConfig::default();
        let result = config.apply_env_overrides(|key| {
            (key == MAX_CONCURRENT_ENV).then(|| "many".to_string())
        });
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"maxNumRestarts": 0}"#).unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.jobs.max_num_restarts, 0);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(Error::Configuration(_))
        ));
    }
}
