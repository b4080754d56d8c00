use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of state that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    QueueUpdate,
    TicketUpdate,
    StatusUpdate,
    Notification,
}

/// What happened. Carried alongside `EventType` rather than folded into it,
/// since the same action (e.g. `Update`) can apply to more than one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Join,
    Call,
    Serve,
    Complete,
    Skip,
    Cancel,
    Update,
    Delete,
}

/// One fan-out event. `payload` carries only the minimal state needed to
/// reconcile a client's view — callers build it, the hub never inspects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub action: EventAction,
    pub payload: Value,
    pub ts: DateTime<Utc>,
}

impl BroadcastEvent {
    pub fn new(event_type: EventType, action: EventAction, payload: Value, ts: DateTime<Utc>) -> Self {
        Self {
            event_type,
            action,
            payload,
            ts,
        }
    }
}

/// What a session's mailbox yields: either a normal event, or a signal that
/// the session fell behind and must request a full snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionMessage {
    Event(BroadcastEvent),
    ResyncRequired,
}
