use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::TicketStoreError;
use crate::models::{Queue, Ticket};

/// Durable ticket and queue store. `update_state` is idempotent on
/// `(ticket_id, expected_version)`: a write whose expected version no
/// longer matches the stored ticket is rejected rather than silently
/// applied twice (spec §4.6).
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn get_by_id(&self, ticket_id: Uuid) -> Option<Ticket>;

    /// Tickets in {waiting, called, serving} for one queue.
    async fn list_active(&self, queue_id: Uuid) -> Vec<Ticket>;

    /// Waiting tickets for one queue, sorted by `position` ascending.
    async fn list_waiting(&self, queue_id: Uuid) -> Vec<Ticket>;

    /// Served tickets for a shop completed at or after `since`.
    async fn list_recent_completed(&self, shop_id: Uuid, since: DateTime<Utc>) -> Vec<Ticket>;

    /// The `n` most recently served tickets for a shop, newest first.
    async fn list_last_n_completed(&self, shop_id: Uuid, n: usize) -> Vec<Ticket>;

    async fn active_ticket_for_customer(&self, queue_id: Uuid, customer_id: Uuid) -> Option<Ticket>;

    async fn specialist_active_ticket_count(&self, shop_id: Uuid, specialist_id: Uuid) -> usize;

    /// The ticket currently `serving` under this specialist in this shop, if any.
    /// Used to enforce "a specialist has at most one ticket in `serving`" (spec §3).
    async fn specialist_serving_ticket(&self, shop_id: Uuid, specialist_id: Uuid) -> Option<Ticket>;

    async fn insert(&self, ticket: Ticket) -> Result<(), TicketStoreError>;

    async fn update_state(&self, ticket: Ticket, expected_version: u64) -> Result<(), TicketStoreError>;

    async fn next_ticket_number(&self, shop_id: Uuid, date: NaiveDate) -> String;

    async fn get_queue(&self, queue_id: Uuid) -> Option<Queue>;

    async fn upsert_queue(&self, queue: Queue);

    /// Every queue currently `open`, across all shops — used by the
    /// periodic sweep tasks (spec §5) to enumerate what needs a pass
    /// without a separate shop/queue directory.
    async fn list_open_queues(&self) -> Vec<Queue>;
}

#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<HashMap<Uuid, Ticket>>,
    by_queue: RwLock<HashMap<Uuid, Vec<Uuid>>>,
    by_shop: RwLock<HashMap<Uuid, Vec<Uuid>>>,
    queues: RwLock<HashMap<Uuid, Queue>>,
    day_sequences: RwLock<HashMap<(Uuid, NaiveDate), u32>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn get_by_id(&self, ticket_id: Uuid) -> Option<Ticket> {
        self.tickets.read().await.get(&ticket_id).cloned()
    }

    async fn list_active(&self, queue_id: Uuid) -> Vec<Ticket> {
        let by_queue = self.by_queue.read().await;
        let tickets = self.tickets.read().await;
        by_queue
            .get(&queue_id)
            .into_iter()
            .flatten()
            .filter_map(|id| tickets.get(id))
            .filter(|t| t.state.is_active())
            .cloned()
            .collect()
    }

    async fn list_waiting(&self, queue_id: Uuid) -> Vec<Ticket> {
        let mut waiting = self.list_active(queue_id).await;
        waiting.retain(|t| t.state == crate::models::TicketState::Waiting);
        waiting.sort_by_key(|t| t.position);
        waiting
    }

    async fn list_recent_completed(&self, shop_id: Uuid, since: DateTime<Utc>) -> Vec<Ticket> {
        let by_shop = self.by_shop.read().await;
        let tickets = self.tickets.read().await;
        by_shop
            .get(&shop_id)
            .into_iter()
            .flatten()
            .filter_map(|id| tickets.get(id))
            .filter(|t| t.state == crate::models::TicketState::Served)
            .filter(|t| t.completed_at.map(|c| c >= since).unwrap_or(false))
            .cloned()
            .collect()
    }

    async fn list_last_n_completed(&self, shop_id: Uuid, n: usize) -> Vec<Ticket> {
        let by_shop = self.by_shop.read().await;
        let tickets = self.tickets.read().await;
        let mut served: Vec<Ticket> = by_shop
            .get(&shop_id)
            .into_iter()
            .flatten()
            .filter_map(|id| tickets.get(id))
            .filter(|t| t.state == crate::models::TicketState::Served)
            .cloned()
            .collect();
        served.sort_by_key(|t| std::cmp::Reverse(t.completed_at));
        served.truncate(n);
        served
    }

    async fn active_ticket_for_customer(&self, queue_id: Uuid, customer_id: Uuid) -> Option<Ticket> {
        self.list_active(queue_id)
            .await
            .into_iter()
            .find(|t| t.customer_id == customer_id)
    }

    async fn specialist_active_ticket_count(&self, shop_id: Uuid, specialist_id: Uuid) -> usize {
        let by_shop = self.by_shop.read().await;
        let tickets = self.tickets.read().await;
        by_shop
            .get(&shop_id)
            .into_iter()
            .flatten()
            .filter_map(|id| tickets.get(id))
            .filter(|t| t.state.is_active() && t.specialist_id == Some(specialist_id))
            .count()
    }

    async fn insert(&self, ticket: Ticket) -> Result<(), TicketStoreError> {
        let mut by_queue = self.by_queue.write().await;
        let mut by_shop = self.by_shop.write().await;
        let mut tickets = self.tickets.write().await;

        by_queue.entry(ticket.queue_id).or_default().push(ticket.id);
        by_shop.entry(ticket.shop_id).or_default().push(ticket.id);
        tickets.insert(ticket.id, ticket);
        Ok(())
    }

    async fn update_state(&self, ticket: Ticket, expected_version: u64) -> Result<(), TicketStoreError> {
        let mut tickets = self.tickets.write().await;
        let current = tickets
            .get(&ticket.id)
            .ok_or(TicketStoreError::NotFound(ticket.id))?;

        if current.version != expected_version {
            return Err(TicketStoreError::VersionConflict {
                ticket_id: ticket.id,
                expected: expected_version,
                actual: current.version,
            });
        }

        let mut next = ticket;
        next.version = expected_version + 1;
        debug!(ticket_id = %next.id, version = next.version, state = ?next.state, "ticket state updated");
        tickets.insert(next.id, next);
        Ok(())
    }

    async fn next_ticket_number(&self, shop_id: Uuid, date: NaiveDate) -> String {
        let mut sequences = self.day_sequences.write().await;
        let counter = sequences.entry((shop_id, date)).or_insert(0);
        *counter += 1;
        format!("Q-{}-{:03}", date.format("%y%m%d"), *counter)
    }

    async fn get_queue(&self, queue_id: Uuid) -> Option<Queue> {
        self.queues.read().await.get(&queue_id).cloned()
    }

    async fn upsert_queue(&self, queue: Queue) {
        self.queues.write().await.insert(queue.id, queue);
    }

    async fn list_open_queues(&self) -> Vec<Queue> {
        self.queues
            .read()
            .await
            .values()
            .filter(|q| q.status == QueueStatus::Open)
            .cloned()
            .collect()
    }
}
