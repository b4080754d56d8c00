pub mod error;
pub mod models;
pub mod store;

pub use error::TicketStoreError;
pub use models::{Priority, Queue, QueueStatus, Ticket, TicketState};
pub use store::{InMemoryTicketStore, TicketStore};
