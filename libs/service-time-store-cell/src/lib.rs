pub mod error;
pub mod models;
pub mod store;

pub use error::ServiceTimeStoreError;
pub use models::ServiceTimeSample;
pub use store::{InMemoryServiceTimeStore, ServiceTimeStore};
