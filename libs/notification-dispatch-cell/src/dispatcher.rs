use std::time::Duration as StdDuration;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::error::NotificationDispatchError;
use crate::models::NotificationMessage;

/// Delivers one notification to whatever external transport owns its
/// channel. Implementations only need to get the payload there and back
/// an `Ok`/`Err` — retry policy lives in `NotificationDispatchService`, not
/// here, so a dispatcher is a single delivery attempt.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), NotificationDispatchError>;
}

/// POSTs the notification as JSON to a single configured webhook URL, the
/// generic egress point standing in for the SMS/email/push transports the
/// spec places out of scope. Mirrors the predecessor's
/// `VideoConferencingIntegrationService`'s use of a plain `reqwest::Client`
/// for outbound HTTP.
pub struct WebhookNotificationDispatcher {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotificationDispatcher {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    fn configured(&self) -> bool {
        !self.webhook_url.is_empty()
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotificationDispatcher {
    #[instrument(skip(self, message), fields(notification_id = %message.id))]
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), NotificationDispatchError> {
        if !self.configured() {
            return Err(NotificationDispatchError::NotConfigured);
        }

        let response = self
            .client
            .post(&self.webhook_url)
            .json(message)
            .timeout(StdDuration::from_secs(10))
            .send()
            .await
            .map_err(|err| NotificationDispatchError::DeliveryFailed { attempts: 1, source: err.into() })?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, "notification webhook returned non-success status");
            return Err(NotificationDispatchError::DeliveryFailed {
                attempts: 1,
                source: anyhow::anyhow!("webhook responded with {status}"),
            });
        }

        Ok(())
    }
}

/// No-op transport used when `notification_webhook_url` is unset: every
/// delivery is logged, not sent, and never retried (spec.md §2 — delivery
/// transports are external collaborators, not something this core must
/// actually reach in every environment).
#[derive(Default)]
pub struct LoggingNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingNotificationDispatcher {
    async fn deliver(&self, message: &NotificationMessage) -> Result<(), NotificationDispatchError> {
        tracing::info!(notification_id = %message.id, user_id = %message.user_id, "notification webhook not configured, logging only");
        Ok(())
    }
}
