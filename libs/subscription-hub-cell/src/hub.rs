use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::SubscriptionHubError;
use crate::mailbox::SessionMailbox;
use crate::models::BroadcastEvent;

fn is_recognized_group(group: &str) -> bool {
    group.starts_with("queue:") || group.starts_with("shop_queues:") || group.starts_with("notifications:")
}

/// Routes state-change events to interested subscribers with at-least-once
/// delivery. Owns subscriber membership exclusively; callers (WSGateway)
/// own authorization and never touch `groups` directly.
pub struct SubscriptionHub {
    groups: RwLock<HashMap<String, HashSet<Uuid>>>,
    mailboxes: RwLock<HashMap<Uuid, Arc<SessionMailbox>>>,
    mailbox_capacity: usize,
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new(crate::mailbox::DEFAULT_MAILBOX_CAPACITY)
    }
}

impl SubscriptionHub {
    /// Builds a hub whose per-session mailboxes are bounded to
    /// `AppConfig::subscriber_backpressure_depth` (spec §4.4 "Backpressure").
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            mailboxes: RwLock::new(HashMap::new()),
            mailbox_capacity,
        }
    }

    /// Creates this session's mailbox. Must be called before `subscribe`.
    pub async fn register_session(&self, session_id: Uuid) -> Arc<SessionMailbox> {
        let mailbox = Arc::new(SessionMailbox::new(self.mailbox_capacity));
        self.mailboxes.write().await.insert(session_id, mailbox.clone());
        mailbox
    }

    /// Tears down a session: drops its mailbox and removes it from every
    /// group it had joined.
    #[instrument(skip(self))]
    pub async fn remove_session(&self, session_id: Uuid) {
        self.mailboxes.write().await.remove(&session_id);
        let mut groups = self.groups.write().await;
        groups.retain(|_, members| {
            members.remove(&session_id);
            !members.is_empty()
        });
        debug!("session removed from subscription hub");
    }

    pub async fn subscribe(&self, session_id: Uuid, group: &str) -> Result<(), SubscriptionHubError> {
        if !is_recognized_group(group) {
            return Err(SubscriptionHubError::InvalidGroup(group.to_string()));
        }
        if !self.mailboxes.read().await.contains_key(&session_id) {
            return Err(SubscriptionHubError::UnknownSession(session_id));
        }

        self.groups
            .write()
            .await
            .entry(group.to_string())
            .or_default()
            .insert(session_id);
        Ok(())
    }

    pub async fn unsubscribe(&self, session_id: Uuid, group: &str) {
        if let Some(members) = self.groups.write().await.get_mut(group) {
            members.remove(&session_id);
        }
    }

    pub async fn unsubscribe_all(&self, session_id: Uuid) {
        let mut groups = self.groups.write().await;
        for members in groups.values_mut() {
            members.remove(&session_id);
        }
        groups.retain(|_, members| !members.is_empty());
    }

    /// Enqueues `event` for every current member of `group`. Delivery is
    /// asynchronous and per-session ordered; callers that publish
    /// sequentially for one queue get the same order delivered to every
    /// subscriber, since this awaits each mailbox push before returning.
    #[instrument(skip(self, event))]
    pub async fn publish(&self, group: &str, event: BroadcastEvent) {
        let members: Vec<Uuid> = match self.groups.read().await.get(group) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        };

        let mailboxes = self.mailboxes.read().await;
        for session_id in members {
            match mailboxes.get(&session_id) {
                Some(mailbox) => mailbox.push(event.clone()).await,
                None => warn!(%session_id, "subscribed session has no registered mailbox"),
            }
        }
    }

    pub async fn group_size(&self, group: &str) -> usize {
        self.groups.read().await.get(group).map(|m| m.len()).unwrap_or(0)
    }

    /// Total registered sessions, regardless of group membership — used by
    /// monitoring to report live subscriber count.
    pub async fn session_count(&self) -> usize {
        self.mailboxes.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventAction, EventType, SessionMessage};
    use chrono::Utc;
    use serde_json::json;

    fn event() -> BroadcastEvent {
        BroadcastEvent::new(EventType::QueueUpdate, EventAction::Call, json!({"ticket": "t1"}), Utc::now())
    }

    #[tokio::test]
    async fn publish_delivers_only_to_subscribed_members() {
        let hub = SubscriptionHub::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mailbox_a = hub.register_session(a).await;
        let _mailbox_b = hub.register_session(b).await;

        hub.subscribe(a, "queue:shop1").await.unwrap();
        hub.publish("queue:shop1", event()).await;

        assert!(matches!(mailbox_a.recv().await, SessionMessage::Event(_)));
    }

    #[tokio::test]
    async fn rejects_unrecognized_group_names() {
        let hub = SubscriptionHub::default();
        let session = Uuid::new_v4();
        hub.register_session(session).await;
        let result = hub.subscribe(session, "admins:all").await;
        assert!(matches!(result, Err(SubscriptionHubError::InvalidGroup(_))));
    }

    #[tokio::test]
    async fn remove_session_clears_membership() {
        let hub = SubscriptionHub::default();
        let session = Uuid::new_v4();
        hub.register_session(session).await;
        hub.subscribe(session, "queue:shop1").await.unwrap();
        assert_eq!(hub.group_size("queue:shop1").await, 1);

        hub.remove_session(session).await;
        assert_eq!(hub.group_size("queue:shop1").await, 0);
    }

    #[tokio::test]
    async fn ordering_is_preserved_per_subscriber() {
        let hub = SubscriptionHub::default();
        let session = Uuid::new_v4();
        let mailbox = hub.register_session(session).await;
        hub.subscribe(session, "queue:shop1").await.unwrap();

        for action in [EventAction::Call, EventAction::Serve, EventAction::Complete] {
            hub.publish("queue:shop1", BroadcastEvent::new(EventType::QueueUpdate, action, json!({}), Utc::now()))
                .await;
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            if let SessionMessage::Event(e) = mailbox.recv().await {
                seen.push(e.action);
            }
        }
        assert_eq!(seen, vec![EventAction::Call, EventAction::Serve, EventAction::Complete]);
    }
}
