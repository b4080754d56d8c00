use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TicketStoreError {
    #[error("ticket {0} not found")]
    NotFound(Uuid),

    #[error("queue {0} not found")]
    QueueNotFound(Uuid),

    #[error("stale write on ticket {ticket_id}: expected version {expected}, store has {actual}")]
    VersionConflict {
        ticket_id: Uuid,
        expected: u64,
        actual: u64,
    },
}
