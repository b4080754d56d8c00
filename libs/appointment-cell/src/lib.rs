pub mod error;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod store;

pub use error::AppointmentError;
pub use models::{
    Appointment, AppointmentStatus, ArrivalOutcome, NextToServe, SequenceSlot, StaffingHint, StaffingInput,
};
pub use scheduler::HybridScheduler;
pub use services::lifecycle::AppointmentLifecycleService;
pub use store::{AppointmentStore, InMemoryAppointmentStore};
