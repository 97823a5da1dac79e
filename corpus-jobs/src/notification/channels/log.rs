//! Log channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::NotificationChannel;
use crate::Result;
use crate::notification::message::JobNotification;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogChannelConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for LogChannelConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Writes notifications to the service log. Failed jobs go out at warn level.
pub struct LogChannel {
    config: LogChannelConfig,
}

impl LogChannel {
    pub fn new(config: LogChannelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, notification: &JobNotification) -> Result<()> {
        if notification.ok {
            info!(
                job_id = %notification.job_id,
                corpus_id = %notification.corpus_id,
                "{}: {}",
                notification.subject,
                notification.body
            );
        } else {
            warn!(
                job_id = %notification.job_id,
                corpus_id = %notification.corpus_id,
                "{}: {}",
                notification.subject,
                notification.body
            );
        }
        Ok(())
    }
}
