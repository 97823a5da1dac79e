//! Notification channels.
//!
//! - `log`: writes the notification to the service log
//! - `webhook`: HTTP POST of a JSON payload

mod log;
mod webhook;

pub use log::{LogChannel, LogChannelConfig};
pub use webhook::{WebhookAuth, WebhookChannel, WebhookConfig};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::message::JobNotification;
use crate::Result;

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn channel_type(&self) -> &'static str;

    fn is_enabled(&self) -> bool;

    async fn send(&self, notification: &JobNotification) -> Result<()>;
}

/// Channel configuration wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    Log(LogChannelConfig),
    Webhook(WebhookConfig),
}

impl ChannelConfig {
    pub fn channel_type(&self) -> &'static str {
        match self {
            Self::Log(_) => "log",
            Self::Webhook(_) => "webhook",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Log(c) => c.enabled,
            Self::Webhook(c) => c.enabled,
        }
    }

    /// Instantiate the configured channel.
    pub fn build(&self) -> Arc<dyn NotificationChannel> {
        match self {
            Self::Log(c) => Arc::new(LogChannel::new(c.clone())),
            Self::Webhook(c) => Arc::new(WebhookChannel::new(c.clone())),
        }
    }
}
