use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        };
        write!(f, "{}", label)
    }
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub customer_id: Uuid,
    pub service_id: Uuid,
    pub specialist_id: Option<Uuid>,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    /// Free-text annotation, e.g. "arrived 38 min late".
    pub notes: String,
}

impl Appointment {
    pub fn new(
        shop_id: Uuid,
        customer_id: Uuid,
        service_id: Uuid,
        specialist_id: Option<Uuid>,
        scheduled_start: DateTime<Utc>,
        scheduled_end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop_id,
            customer_id,
            service_id,
            specialist_id,
            scheduled_start,
            scheduled_end,
            status: AppointmentStatus::Scheduled,
            actual_start: None,
            actual_end: None,
            notes: String::new(),
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.scheduled_end - self.scheduled_start).num_minutes()
    }
}

/// Result of `HybridScheduler::next_to_serve` (spec §4.2).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextToServe {
    Appointment { appointment_id: Uuid },
    WalkIn { ticket_id: Uuid },
    None,
}

/// One entry of `HybridScheduler::service_sequence`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceSlot {
    Appointment {
        appointment_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    WalkIn {
        ticket_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl SequenceSlot {
    pub fn start(&self) -> DateTime<Utc> {
        match self {
            SequenceSlot::Appointment { start, .. } => *start,
            SequenceSlot::WalkIn { start, .. } => *start,
        }
    }
}

/// Outcome of reconciling a customer's appointment-day arrival into the
/// live queue (spec §4.2 "Appointment arrival handling").
#[derive(Debug, Clone, Serialize)]
pub enum ArrivalOutcome {
    /// Arrived within the 30-minute grace window either side of the
    /// scheduled start; the appointment is confirmed in place.
    Confirmed,
    /// Arrived more than 30 minutes early; should be enqueued as a
    /// high-priority walk-in linked back to this appointment.
    EarlyWalkIn,
    /// Arrived more than 30 minutes late; accepted, lateness recorded.
    LateAccepted { minutes_late: i64 },
}

/// Advisory operator hints from `HybridScheduler::staffing_recommendations`.
/// Never mutate state; surfaced for humans to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffingHint {
    Overload,
    HighWaitTime,
    Overstaffed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffingInput {
    pub waiting_count: u32,
    pub upcoming_appointments_2h: u32,
    pub active_specialists: u32,
    pub moving_average_wait_minutes: f64,
}
