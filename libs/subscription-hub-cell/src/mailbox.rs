use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

use crate::models::{BroadcastEvent, SessionMessage};

/// Fallback bounded depth before a session is told to resync instead of
/// drained further, used only where no `AppConfig` is threaded through
/// (e.g. bare unit tests). Production callers pass
/// `AppConfig::subscriber_backpressure_depth` via `SessionMailbox::new`.
pub(crate) const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Per-session outbound mailbox. `push` never blocks the publisher: once
/// full it drops everything buffered and leaves a single `ResyncRequired`
/// behind, so one slow client can never stall fan-out to the rest.
pub struct SessionMailbox {
    queue: Mutex<VecDeque<SessionMessage>>,
    notify: Notify,
    capacity: usize,
}

impl SessionMailbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    pub async fn push(&self, event: BroadcastEvent) {
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.capacity {
            queue.clear();
            queue.push_back(SessionMessage::ResyncRequired);
        } else {
            queue.push_back(SessionMessage::Event(event));
        }
        drop(queue);
        self.notify.notify_one();
    }

    /// Waits for and returns the next message, in FIFO order.
    pub async fn recv(&self) -> SessionMessage {
        loop {
            {
                let mut queue = self.queue.lock().await;
                if let Some(message) = queue.pop_front() {
                    return message;
                }
            }
            self.notify.notified().await;
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

impl Default for SessionMailbox {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventAction;
    use crate::models::EventType;
    use chrono::Utc;
    use serde_json::json;

    fn event() -> BroadcastEvent {
        BroadcastEvent::new(EventType::QueueUpdate, EventAction::Join, json!({}), Utc::now())
    }

    #[tokio::test]
    async fn delivers_messages_fifo() {
        let mailbox = SessionMailbox::new(DEFAULT_MAILBOX_CAPACITY);
        mailbox.push(event()).await;
        mailbox.push(event()).await;

        assert!(matches!(mailbox.recv().await, SessionMessage::Event(_)));
        assert!(matches!(mailbox.recv().await, SessionMessage::Event(_)));
    }

    #[tokio::test]
    async fn overflow_clears_queue_and_signals_resync() {
        let mailbox = SessionMailbox::new(DEFAULT_MAILBOX_CAPACITY);
        for _ in 0..DEFAULT_MAILBOX_CAPACITY + 5 {
            mailbox.push(event()).await;
        }

        assert_eq!(mailbox.len().await, 1);
        assert!(matches!(mailbox.recv().await, SessionMessage::ResyncRequired));
    }

    #[tokio::test]
    async fn respects_a_configured_capacity_smaller_than_the_default() {
        let mailbox = SessionMailbox::new(4);
        for _ in 0..6 {
            mailbox.push(event()).await;
        }

        assert_eq!(mailbox.len().await, 1);
        assert!(matches!(mailbox.recv().await, SessionMessage::ResyncRequired));
    }
}
