use thiserror::Error;
use uuid::Uuid;

use ticket_store_cell::{TicketState, TicketStoreError};

/// Error taxonomy for the queue engine (spec §7): validation and
/// precondition errors are surfaced to the caller with no state change;
/// `ShopHalted` is the fatal case — a prior invariant violation closed the
/// shop's actor to further mutations until an operator clears it.
#[derive(Error, Debug)]
pub enum QueueEngineError {
    #[error("ticket {0} not found")]
    TicketNotFound(Uuid),

    #[error("queue {0} not found")]
    QueueNotFound(Uuid),

    #[error("queue is closed")]
    QueueClosed,

    #[error("customer already has an active ticket in this queue")]
    DuplicateCustomer,

    #[error("queue is at capacity")]
    AtCapacity,

    #[error("illegal state: ticket {ticket_id} is {state:?}")]
    IllegalState { ticket_id: Uuid, state: TicketState },

    #[error("specialist {0} already has a ticket in serving")]
    SpecialistBusy(Uuid),

    #[error("position {0} is out of range")]
    InvalidPosition(u32),

    #[error("shop {0} is halted pending operator intervention")]
    ShopHalted(Uuid),

    #[error("no waiting ticket is eligible to be called")]
    QueueEmpty,

    #[error("store error: {0}")]
    Store(#[from] TicketStoreError),

    #[error("queue engine actor is unavailable")]
    ActorUnavailable,
}
