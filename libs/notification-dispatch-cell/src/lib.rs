pub mod dispatcher;
pub mod error;
pub mod models;
pub mod service;

pub use dispatcher::{LoggingNotificationDispatcher, NotificationDispatcher, WebhookNotificationDispatcher};
pub use error::NotificationDispatchError;
pub use models::{NotificationChannel, NotificationMessage, NotificationStatus};
pub use service::NotificationDispatchService;
