use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// External transport a notification is ultimately destined for. Only the
/// dispatch contract is in scope here (spec §2 "notification delivery
/// transports ... only the dispatch contract is specified") — no channel
/// does anything different from any other until it reaches the configured
/// webhook, which is told the channel and decides how to route it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    InApp,
    Email,
    Sms,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Acknowledged,
    Failed,
}

/// One outbound notification. `user_id` doubles as the `notifications:<id>`
/// subscription hub group this also fans out to — dispatch to the external
/// transport and in-app delivery via the hub are independent, so a webhook
/// outage never blocks the WebSocket copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel: NotificationChannel,
    pub title: String,
    pub body: String,
    pub payload: Value,
    pub status: NotificationStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationMessage {
    pub fn new(
        user_id: Uuid,
        channel: NotificationChannel,
        title: impl Into<String>,
        body: impl Into<String>,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            channel,
            title: title.into(),
            body: body.into(),
            payload,
            status: NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
        }
    }
}
