use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SubscriptionHubError {
    #[error("session {0} is not registered")]
    UnknownSession(Uuid),

    #[error("group name {0:?} is not a recognized subscriber group")]
    InvalidGroup(String),
}
