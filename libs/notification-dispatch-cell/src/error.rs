use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum NotificationDispatchError {
    #[error("notification {0} not found")]
    NotFound(Uuid),

    #[error("notification {0} already acknowledged")]
    AlreadyAcknowledged(Uuid),

    #[error("no webhook configured, dispatch skipped")]
    NotConfigured,

    #[error("delivery failed after {attempts} attempt(s): {source}")]
    DeliveryFailed { attempts: u32, source: anyhow::Error },
}
