use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use queue_engine_cell::QueueSnapshot;
use ticket_store_cell::Ticket;

/// Inbound wire messages (spec §6). `JoinQueue`, `CallNext`, and
/// `GetQueueState` carry an explicit `queue_id`: the spec's wire listing
/// elides it the way it elides other implied fields, but every QueueEngine
/// operation is scoped to one queue and a session may be subscribed to
/// several, so the target has to travel with the request.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping {
        timestamp: Option<DateTime<Utc>>,
    },
    JoinQueue {
        queue_id: Uuid,
        customer_id: Uuid,
        service_id: Option<Uuid>,
    },
    CallNext {
        queue_id: Uuid,
        specialist_id: Option<Uuid>,
    },
    MarkServing {
        ticket_id: Uuid,
        specialist_id: Option<Uuid>,
    },
    MarkServed {
        ticket_id: Uuid,
    },
    CancelTicket {
        ticket_id: Uuid,
    },
    GetQueueState {
        queue_id: Uuid,
    },
    Subscribe {
        groups: Vec<String>,
    },
    Unsubscribe {
        groups: Vec<String>,
    },
    AcknowledgeNotification {
        notification_id: Uuid,
    },
    CheckInAppointment {
        appointment_id: Uuid,
        queue_id: Uuid,
    },
}

/// Outbound wire messages the gateway originates itself. Fan-out events
/// (`queue_update`/`ticket_update`/`status_update`/`notification`) are
/// forwarded as the `BroadcastEvent` the hub already produces — its own
/// `{type, action, payload, ts}` serialization *is* the wire schema (spec
/// §4.4), so there is no separate variant for them here.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        session_id: Uuid,
        user_id: String,
        server_time: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    QueueState {
        queue_id: Uuid,
        snapshot: QueueSnapshot,
    },
    Error {
        code: String,
        message: String,
    },
    ResyncRequired,
    ArrivalHandled {
        appointment_id: Uuid,
        outcome: String,
        ticket: Option<Ticket>,
    },
}
