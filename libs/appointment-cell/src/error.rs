use thiserror::Error;
use uuid::Uuid;

use crate::models::AppointmentStatus;

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("appointment {0} not found")]
    NotFound(Uuid),

    #[error("appointment is not scheduled for today")]
    WrongDay,

    #[error("cannot transition appointment from {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("invalid appointment window: {0}")]
    InvalidTime(String),
}
