pub mod engine;
pub mod error;
pub mod models;
pub mod tasks;

pub use engine::QueueEngine;
pub use error::QueueEngineError;
pub use models::{JoinRequest, QueueSnapshot};
pub use tasks::spawn_periodic_tasks;
