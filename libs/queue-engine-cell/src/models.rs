use serde::Serialize;
use ticket_store_cell::{Priority, QueueStatus, Ticket};
use uuid::Uuid;

/// Parameters for `QueueEngine::join` (spec §4.1). `eligible_specialist_ids`
/// is the auto-assignment candidate pool the caller (shop roster lives
/// outside this crate) — the engine picks whichever has the fewest active
/// tickets; empty means no auto-assignment. `priority` defaults to
/// `Normal`; the hybrid scheduler's early-arrival path (spec §4.2
/// "enqueue as a walk-in with `high` priority") is the one caller that
/// sets it explicitly.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub queue_id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub eligible_specialist_ids: Vec<Uuid>,
    pub priority: Priority,
}

impl Default for JoinRequest {
    fn default() -> Self {
        Self {
            queue_id: Uuid::nil(),
            customer_id: Uuid::nil(),
            service_id: None,
            appointment_id: None,
            eligible_specialist_ids: Vec::new(),
            priority: Priority::Normal,
        }
    }
}

/// Read-only view of one queue's active tickets, counts, and current
/// estimates (spec §4.1 `snapshot`). Produced under the shop's
/// serialization lock so it is always internally consistent.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub queue_id: Uuid,
    pub shop_id: Uuid,
    pub status: QueueStatus,
    pub max_capacity: u32,
    pub waiting: Vec<Ticket>,
    pub called: Vec<Ticket>,
    pub serving: Vec<Ticket>,
}

impl QueueSnapshot {
    pub fn active_count(&self) -> usize {
        self.waiting.len() + self.called.len()
    }
}
