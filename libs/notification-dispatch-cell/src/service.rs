use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{instrument, warn};
use uuid::Uuid;

use clock_cell::Clock;
use shared_config::AppConfig;

use crate::dispatcher::NotificationDispatcher;
use crate::error::NotificationDispatchError;
use crate::models::{NotificationChannel, NotificationMessage, NotificationStatus};

/// Outbound notification queue (spec.md component share table, "Outbound
/// notification queue to external transports"). Owns retry policy; a
/// `NotificationDispatcher` only performs one delivery attempt. Mirrors the
/// predecessor's fixed-delay job retry
/// (`BookingWorkerService::start`'s `tokio::time::sleep(retry_delay_seconds)`
/// before `retry_job`), generalized here to exponential backoff since a
/// single fixed delay either retries a transient 503 too eagerly or makes a
/// genuinely down webhook wait unnecessarily long before the next attempt.
pub struct NotificationDispatchService {
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    base_delay: std::time::Duration,
    messages: RwLock<HashMap<Uuid, NotificationMessage>>,
}

impl NotificationDispatchService {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, clock: Arc<dyn Clock>, config: &AppConfig) -> Self {
        Self {
            dispatcher,
            clock,
            max_attempts: config.notification_max_attempts.max(1),
            base_delay: config.notification_retry_base_delay,
            messages: RwLock::new(HashMap::new()),
        }
    }

    /// Enqueues and immediately attempts delivery, retrying with exponential
    /// backoff up to `max_attempts` times. Returns the final stored state
    /// (never an `Err` for a failed delivery — `status: Failed` carries
    /// that outcome so callers don't have to treat "notification recorded"
    /// and "notification delivered" as the same event).
    #[instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        user_id: Uuid,
        channel: NotificationChannel,
        title: impl Into<String>,
        body: impl Into<String>,
        payload: Value,
    ) -> NotificationMessage {
        let mut message = NotificationMessage::new(user_id, channel, title, body, payload, self.clock.now());
        self.messages.write().await.insert(message.id, message.clone());

        for attempt in 1..=self.max_attempts {
            message.attempts = attempt;
            match self.dispatcher.deliver(&message).await {
                Ok(()) => {
                    message.status = NotificationStatus::Sent;
                    message.last_error = None;
                    break;
                }
                Err(err) => {
                    warn!(notification_id = %message.id, attempt, error = %err, "notification delivery attempt failed");
                    message.last_error = Some(err.to_string());
                    if attempt < self.max_attempts {
                        let delay = self.base_delay * 2u32.pow(attempt - 1);
                        tokio::time::sleep(delay).await;
                    } else {
                        message.status = NotificationStatus::Failed;
                    }
                }
            }
        }

        self.messages.write().await.insert(message.id, message.clone());
        message
    }

    /// Marks a notification acknowledged (spec.md §6 `acknowledge_notification`
    /// client message). Acknowledgement is independent of delivery status —
    /// a client that already saw the event via the WebSocket fan-out can
    /// acknowledge a notification this service never managed to deliver.
    pub async fn acknowledge(&self, notification_id: Uuid) -> Result<NotificationMessage, NotificationDispatchError> {
        let mut messages = self.messages.write().await;
        let message = messages
            .get_mut(&notification_id)
            .ok_or(NotificationDispatchError::NotFound(notification_id))?;

        if message.status == NotificationStatus::Acknowledged {
            return Err(NotificationDispatchError::AlreadyAcknowledged(notification_id));
        }

        message.status = NotificationStatus::Acknowledged;
        Ok(message.clone())
    }

    pub async fn get(&self, notification_id: Uuid) -> Option<NotificationMessage> {
        self.messages.read().await.get(&notification_id).cloned()
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Vec<NotificationMessage> {
        self.messages.read().await.values().filter(|m| m.user_id == user_id).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use clock_cell::FixedClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysFails;
    #[async_trait]
    impl NotificationDispatcher for AlwaysFails {
        async fn deliver(&self, _message: &NotificationMessage) -> Result<(), NotificationDispatchError> {
            Err(NotificationDispatchError::NotConfigured)
        }
    }

    struct AlwaysSucceeds;
    #[async_trait]
    impl NotificationDispatcher for AlwaysSucceeds {
        async fn deliver(&self, _message: &NotificationMessage) -> Result<(), NotificationDispatchError> {
            Ok(())
        }
    }

    struct FailsTwiceThenSucceeds {
        calls: AtomicU32,
    }
    #[async_trait]
    impl NotificationDispatcher for FailsTwiceThenSucceeds {
        async fn deliver(&self, _message: &NotificationMessage) -> Result<(), NotificationDispatchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < 3 {
                Err(NotificationDispatchError::NotConfigured)
            } else {
                Ok(())
            }
        }
    }

    fn config(max_attempts: u32) -> AppConfig {
        let mut config = AppConfig::default();
        config.notification_max_attempts = max_attempts;
        config.notification_retry_base_delay = std::time::Duration::from_millis(1);
        config
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()))
    }

    #[tokio::test]
    async fn successful_delivery_marks_sent_on_first_attempt() {
        let service = NotificationDispatchService::new(Arc::new(AlwaysSucceeds), clock(), &config(3));
        let user = Uuid::new_v4();
        let result = service.enqueue(user, NotificationChannel::Email, "t", "b", json!({})).await;
        assert_eq!(result.status, NotificationStatus::Sent);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn exhausting_retries_marks_failed() {
        let service = NotificationDispatchService::new(Arc::new(AlwaysFails), clock(), &config(3));
        let user = Uuid::new_v4();
        let result = service.enqueue(user, NotificationChannel::Sms, "t", "b", json!({})).await;
        assert_eq!(result.status, NotificationStatus::Failed);
        assert_eq!(result.attempts, 3);
        assert!(result.last_error.is_some());
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let dispatcher = Arc::new(FailsTwiceThenSucceeds { calls: AtomicU32::new(0) });
        let service = NotificationDispatchService::new(dispatcher, clock(), &config(5));
        let user = Uuid::new_v4();
        let result = service.enqueue(user, NotificationChannel::Push, "t", "b", json!({})).await;
        assert_eq!(result.status, NotificationStatus::Sent);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn acknowledge_is_rejected_twice() {
        let service = NotificationDispatchService::new(Arc::new(AlwaysSucceeds), clock(), &config(3));
        let user = Uuid::new_v4();
        let message = service.enqueue(user, NotificationChannel::InApp, "t", "b", json!({})).await;

        service.acknowledge(message.id).await.unwrap();
        let result = service.acknowledge(message.id).await;
        assert!(matches!(result, Err(NotificationDispatchError::AlreadyAcknowledged(_))));
    }

    #[tokio::test]
    async fn list_for_user_only_returns_that_users_notifications() {
        let service = NotificationDispatchService::new(Arc::new(AlwaysSucceeds), clock(), &config(3));
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        service.enqueue(user_a, NotificationChannel::Email, "t", "b", json!({})).await;
        service.enqueue(user_b, NotificationChannel::Email, "t", "b", json!({})).await;

        let for_a = service.list_for_user(user_a).await;
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].user_id, user_a);
    }
}
