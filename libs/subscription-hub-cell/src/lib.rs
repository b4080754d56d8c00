pub mod error;
pub mod hub;
pub mod mailbox;
pub mod models;

pub use error::SubscriptionHubError;
pub use hub::SubscriptionHub;
pub use mailbox::SessionMailbox;
pub use models::{BroadcastEvent, EventAction, EventType, SessionMessage};
