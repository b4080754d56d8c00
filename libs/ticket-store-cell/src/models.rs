use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Waiting,
    Called,
    Serving,
    Served,
    Skipped,
    Cancelled,
}

impl TicketState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketState::Served | TicketState::Skipped | TicketState::Cancelled)
    }

    pub fn is_active(self) -> bool {
        matches!(self, TicketState::Waiting | TicketState::Called | TicketState::Serving)
    }
}

/// Ordered low..vip as their numeric discriminants, so `priority as i32`
/// sorts the way `next_to_serve` needs (spec §3, "Effective priority").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    Normal = 2,
    High = 3,
    Urgent = 4,
    Vip = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Open,
    Paused,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub name: String,
    pub status: QueueStatus,
    /// 0 means unlimited.
    pub max_capacity: u32,
    /// Home city of the shop this queue belongs to. Shops are otherwise an
    /// opaque external concept here (no Shop store exists in this core) but
    /// WS subscription authorization needs to compare a customer's city
    /// against the shop's, so it is denormalized onto the queue.
    pub shop_city: Option<String>,
}

impl Queue {
    pub fn is_unlimited(&self) -> bool {
        self.max_capacity == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub number: String,
    pub shop_id: Uuid,
    pub queue_id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Option<Uuid>,
    pub specialist_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub state: TicketState,
    pub position: u32,
    pub priority: Priority,
    pub notes: String,
    pub joined_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub serve_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_wait_minutes: Option<u32>,
    pub actual_wait_minutes: Option<i64>,
    /// Bumped on every store update; `update_state` rejects a write whose
    /// `expected_version` does not match, making re-applied mutations a
    /// no-op instead of a double-apply (spec §4.6).
    pub version: u64,
}

impl Ticket {
    pub fn new(
        shop_id: Uuid,
        queue_id: Uuid,
        customer_id: Uuid,
        service_id: Option<Uuid>,
        appointment_id: Option<Uuid>,
        number: String,
        position: u32,
        priority: Priority,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            shop_id,
            queue_id,
            customer_id,
            service_id,
            specialist_id: None,
            appointment_id,
            state: TicketState::Waiting,
            position,
            priority,
            notes: String::new(),
            joined_at,
            called_at: None,
            serve_started_at: None,
            completed_at: None,
            estimated_wait_minutes: None,
            actual_wait_minutes: None,
            version: 0,
        }
    }

    /// The key `call_next`/`reorder` sort on: higher priority first, then
    /// earlier arrival (spec "Effective priority").
    pub fn effective_priority_key(&self) -> (std::cmp::Reverse<Priority>, DateTime<Utc>) {
        (std::cmp::Reverse(self.priority), self.joined_at)
    }
}
