//! Generic webhook channel.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::NotificationChannel;
use crate::notification::message::JobNotification;
use crate::{Error, Result};

/// Webhook channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub auth: Option<WebhookAuth>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            auth: None,
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookAuth {
    Bearer { token: String },
}

/// reqwest is built without a default rustls provider.
fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Self {
        install_rustls_provider();
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    fn build_payload(&self, notification: &JobNotification) -> serde_json::Value {
        json!({
            "event": "job_finished",
            "subject": notification.subject,
            "body": notification.body,
            "timestamp": notification.timestamp.to_rfc3339(),
            "job": notification,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.url.is_empty()
    }

    async fn send(&self, notification: &JobNotification) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let mut request = self
            .client
            .post(&self.config.url)
            .json(&self.build_payload(notification));
        if let Some(WebhookAuth::Bearer { token }) = &self.config.auth {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Notification(format!("Webhook request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "Webhook failed: {status} - {body}"
            )));
        }

        debug!(job_id = %notification.job_id, "Webhook notification sent");
        Ok(())
    }
}
