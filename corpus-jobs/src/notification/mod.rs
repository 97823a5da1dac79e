//! Notifications about finished jobs.
//!
//! The dispatcher reports every terminal job state through a [`JobNotifier`].
//! [`NotificationService`] is the production implementation: it turns the
//! record into a [`JobNotification`] and fans it out to the configured
//! channels. Delivery problems are logged and never reach the engine.

pub mod channels;
pub mod message;
pub mod service;

use async_trait::async_trait;

use crate::Result;
use crate::jobs::JobRecord;

pub use channels::{ChannelConfig, LogChannelConfig, NotificationChannel, WebhookConfig};
pub use message::JobNotification;
pub use service::{NotificationService, NotificationServiceConfig, NotificationStats};

/// Receiver of terminal job states.
#[async_trait]
pub trait JobNotifier: Send + Sync {
    async fn job_finished(&self, record: &JobRecord) -> Result<()>;
}

/// Notifier that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl JobNotifier for NoopNotifier {
    async fn job_finished(&self, _record: &JobRecord) -> Result<()> {
        Ok(())
    }
}
