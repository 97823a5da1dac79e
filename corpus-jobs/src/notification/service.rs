//! Notification service implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::JobNotifier;
use super::channels::{ChannelConfig, NotificationChannel};
use super::message::JobNotification;
use crate::Result;
use crate::jobs::JobRecord;

/// Configuration for the notification service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationServiceConfig {
    pub enabled: bool,
    pub channels: Vec<ChannelConfig>,
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationStats {
    pub channel_count: usize,
    pub delivered: u64,
    pub failed: u64,
}

/// Fans job notifications out to the configured channels.
pub struct NotificationService {
    config: NotificationServiceConfig,
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl NotificationService {
    pub fn with_config(config: NotificationServiceConfig) -> Self {
        let channels: Vec<Arc<dyn NotificationChannel>> = config
            .channels
            .iter()
            .filter(|c| c.is_enabled())
            .map(ChannelConfig::build)
            .collect();
        Self {
            config,
            channels: RwLock::new(channels),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        self.channels.write().push(channel);
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Deliver to every enabled channel. Failures are counted and logged.
    pub async fn notify(&self, notification: &JobNotification) {
        if !self.config.enabled {
            return;
        }
        let channels: Vec<_> = self.channels.read().iter().cloned().collect();
        for channel in channels.iter().filter(|c| c.is_enabled()) {
            match channel.send(notification).await {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        job_id = %notification.job_id,
                        channel = channel.channel_type(),
                        "Notification delivered"
                    );
                }
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        job_id = %notification.job_id,
                        channel = channel.channel_type(),
                        error = %e,
                        "Failed to deliver notification"
                    );
                }
            }
        }
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            channel_count: self.channels.read().len(),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::with_config(NotificationServiceConfig::default())
    }
}

#[async_trait]
impl JobNotifier for NotificationService {
    async fn job_finished(&self, record: &JobRecord) -> Result<()> {
        self.notify(&JobNotification::from_record(record)).await;
        Ok(())
    }
}
