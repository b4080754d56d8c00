use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::instrument;
use uuid::Uuid;

use ticket_store_cell::TicketStore;

use crate::error::AppointmentError;
use crate::models::{
    AppointmentStatus, ArrivalOutcome, NextToServe, SequenceSlot, StaffingHint, StaffingInput,
};
use crate::store::AppointmentStore;

const NEXT_TO_SERVE_GRACE: Duration = Duration::minutes(5);
const NEXT_TO_SERVE_LOOKAHEAD: Duration = Duration::minutes(15);
const ARRIVAL_GRACE: Duration = Duration::minutes(30);
const DEFAULT_AVG_SERVICE_MINUTES: f64 = 15.0;
const AVG_SERVICE_SAMPLE_SIZE: usize = 20;

/// Reconciles scheduled appointments with walk-in tickets (spec §4.2).
/// Reads from `AppointmentStore` and `TicketStore`; never mutates either —
/// callers apply the returned decisions.
pub struct HybridScheduler {
    appointments: Arc<dyn AppointmentStore>,
    tickets: Arc<dyn TicketStore>,
}

impl HybridScheduler {
    pub fn new(appointments: Arc<dyn AppointmentStore>, tickets: Arc<dyn TicketStore>) -> Self {
        Self { appointments, tickets }
    }

    #[instrument(skip(self))]
    pub async fn next_to_serve(
        &self,
        shop_id: Uuid,
        queue_id: Uuid,
        specialist_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> NextToServe {
        let due = self
            .appointments
            .list_in_window(shop_id, now - NEXT_TO_SERVE_GRACE, now + NEXT_TO_SERVE_LOOKAHEAD)
            .await;

        let mut due: Vec<_> = due
            .into_iter()
            .filter(|a| !a.status.is_terminal())
            .filter(|a| specialist_id.map(|s| a.specialist_id == Some(s)).unwrap_or(true))
            .collect();
        due.sort_by_key(|a| a.scheduled_start);

        if let Some(appointment) = due.into_iter().next() {
            return NextToServe::Appointment {
                appointment_id: appointment.id,
            };
        }

        match self.tickets.list_waiting(queue_id).await.into_iter().next() {
            Some(ticket) => NextToServe::WalkIn { ticket_id: ticket.id },
            None => NextToServe::None,
        }
    }

    #[instrument(skip(self))]
    pub async fn service_sequence(
        &self,
        shop_id: Uuid,
        queue_id: Uuid,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<SequenceSlot> {
        let mut appointments = self.appointments.list_in_window(shop_id, window_start, window_end).await;
        appointments.retain(|a| !a.status.is_terminal());
        appointments.sort_by_key(|a| a.scheduled_start);

        let avg_service_minutes = self.avg_service_minutes(shop_id).await;

        let mut slots: Vec<SequenceSlot> = appointments
            .iter()
            .map(|a| SequenceSlot::Appointment {
                appointment_id: a.id,
                start: a.scheduled_start,
                end: a.scheduled_end,
            })
            .collect();

        let mut waiting = self.tickets.list_waiting(queue_id).await.into_iter();

        let mut cursor = window_start.max(now);
        let mut gap_bounds: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::new();
        for appointment in &appointments {
            if appointment.scheduled_start > cursor {
                gap_bounds.push((cursor, appointment.scheduled_start));
            }
            cursor = cursor.max(appointment.scheduled_end);
        }
        if cursor < window_end {
            gap_bounds.push((cursor, window_end));
        }

        let step = Duration::minutes(avg_service_minutes.round() as i64).max(Duration::minutes(1));
        for (gap_start, gap_end) in gap_bounds {
            if gap_end - gap_start < Duration::minutes(avg_service_minutes.round() as i64) {
                continue;
            }
            let mut slot_start = gap_start;
            while slot_start + step <= gap_end {
                let Some(ticket) = waiting.next() else { break };
                slots.push(SequenceSlot::WalkIn {
                    ticket_id: ticket.id,
                    start: slot_start,
                    end: slot_start + step,
                });
                slot_start += step;
            }
        }

        slots.sort_by_key(|s| s.start());
        slots
    }

    async fn avg_service_minutes(&self, shop_id: Uuid) -> f64 {
        let recent = self.tickets.list_last_n_completed(shop_id, AVG_SERVICE_SAMPLE_SIZE).await;
        let durations: Vec<f64> = recent
            .iter()
            .filter_map(|t| match (t.serve_started_at, t.completed_at) {
                (Some(start), Some(end)) => Some((end - start).num_minutes() as f64),
                _ => None,
            })
            .filter(|d| (0.0..=120.0).contains(d))
            .collect();

        if durations.is_empty() {
            DEFAULT_AVG_SERVICE_MINUTES
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        }
    }

    /// Reconciles a customer's arrival for an appointment scheduled today.
    #[instrument(skip(self))]
    pub async fn handle_arrival(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ArrivalOutcome, AppointmentError> {
        let mut appointment = self
            .appointments
            .get_by_id(appointment_id)
            .await
            .ok_or(AppointmentError::NotFound(appointment_id))?;

        if appointment.scheduled_start.date_naive() != now.date_naive() {
            return Err(AppointmentError::WrongDay);
        }

        let delta = now - appointment.scheduled_start;

        let outcome = if delta < -ARRIVAL_GRACE {
            ArrivalOutcome::EarlyWalkIn
        } else if delta > ARRIVAL_GRACE {
            let minutes_late = delta.num_minutes();
            appointment.notes = format!("arrived {} min late", minutes_late);
            appointment.status = AppointmentStatus::Confirmed;
            self.appointments.update(appointment).await?;
            ArrivalOutcome::LateAccepted { minutes_late }
        } else {
            appointment.status = AppointmentStatus::Confirmed;
            self.appointments.update(appointment).await?;
            ArrivalOutcome::Confirmed
        };

        Ok(outcome)
    }

    /// Advisory staffing hints; never alters state (spec §4.2).
    pub fn staffing_recommendations(&self, input: &StaffingInput) -> Vec<StaffingHint> {
        let w = input.waiting_count as f64;
        let a = input.upcoming_appointments_2h as f64;
        let s = input.active_specialists.max(1) as f64;

        let mut hints = Vec::new();

        if w > 5.0 * s || a / 2.0 > 3.0 * s {
            hints.push(StaffingHint::Overload);
        }
        if input.moving_average_wait_minutes > 30.0 {
            hints.push(StaffingHint::HighWaitTime);
        }
        if input.active_specialists > 1 && input.waiting_count == 0 && input.upcoming_appointments_2h < 3 {
            hints.push(StaffingHint::Overstaffed);
        }

        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAppointmentStore;
    use ticket_store_cell::{InMemoryTicketStore, Priority, Queue, QueueStatus, Ticket};

    fn scheduler() -> (HybridScheduler, Arc<InMemoryAppointmentStore>, Arc<InMemoryTicketStore>) {
        let appointments = Arc::new(InMemoryAppointmentStore::new());
        let tickets = Arc::new(InMemoryTicketStore::new());
        let scheduler = HybridScheduler::new(appointments.clone(), tickets.clone());
        (scheduler, appointments, tickets)
    }

    #[tokio::test]
    async fn next_to_serve_prefers_due_appointment() {
        let (scheduler, appointments, _tickets) = scheduler();
        let shop = Uuid::new_v4();
        let now = Utc::now();

        let appointment = crate::models::Appointment::new(
            shop,
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            now + Duration::minutes(3),
            now + Duration::minutes(33),
        );
        appointments.insert(appointment.clone()).await;

        let decision = scheduler.next_to_serve(shop, Uuid::new_v4(), None, now).await;
        assert!(matches!(decision, NextToServe::Appointment { appointment_id } if appointment_id == appointment.id));
    }

    #[tokio::test]
    async fn next_to_serve_falls_back_to_walk_in() {
        let (scheduler, _appointments, tickets) = scheduler();
        let shop = Uuid::new_v4();
        let queue = Queue {
            id: Uuid::new_v4(),
            shop_id: shop,
            name: "front".to_string(),
            status: QueueStatus::Open,
            max_capacity: 0,
            shop_city: None,
        };
        tickets.upsert_queue(queue.clone()).await;

        let ticket = Ticket::new(
            shop,
            queue.id,
            Uuid::new_v4(),
            None,
            None,
            "Q-260101-001".to_string(),
            1,
            Priority::Normal,
            Utc::now(),
        );
        tickets.insert(ticket.clone()).await.unwrap();

        let decision = scheduler.next_to_serve(shop, queue.id, None, Utc::now()).await;
        assert!(matches!(decision, NextToServe::WalkIn { ticket_id } if ticket_id == ticket.id));
    }

    #[tokio::test]
    async fn handle_arrival_rejects_wrong_day() {
        let (scheduler, appointments, _tickets) = scheduler();
        let shop = Uuid::new_v4();
        let now = Utc::now();
        let appointment = crate::models::Appointment::new(
            shop,
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            now + Duration::days(1),
            now + Duration::days(1) + Duration::minutes(30),
        );
        appointments.insert(appointment.clone()).await;

        let result = scheduler.handle_arrival(appointment.id, now).await;
        assert!(matches!(result, Err(AppointmentError::WrongDay)));
    }

    #[tokio::test]
    async fn handle_arrival_flags_early_walk_in() {
        let (scheduler, appointments, _tickets) = scheduler();
        let shop = Uuid::new_v4();
        let now = Utc::now();
        let appointment = crate::models::Appointment::new(
            shop,
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            now + Duration::minutes(45),
            now + Duration::minutes(75),
        );
        appointments.insert(appointment.clone()).await;

        let outcome = scheduler.handle_arrival(appointment.id, now).await.unwrap();
        assert!(matches!(outcome, ArrivalOutcome::EarlyWalkIn));
    }

    #[tokio::test]
    async fn handle_arrival_records_lateness() {
        let (scheduler, appointments, _tickets) = scheduler();
        let shop = Uuid::new_v4();
        let now = Utc::now();
        let appointment = crate::models::Appointment::new(
            shop,
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            now - Duration::minutes(40),
            now - Duration::minutes(10),
        );
        appointments.insert(appointment.clone()).await;

        let outcome = scheduler.handle_arrival(appointment.id, now).await.unwrap();
        assert!(matches!(outcome, ArrivalOutcome::LateAccepted { minutes_late } if minutes_late >= 40));

        let stored = appointments.get_by_id(appointment.id).await.unwrap();
        assert!(stored.notes.contains("late"));
    }

    #[test]
    fn staffing_hints_flag_overload() {
        let (scheduler, _appointments, _tickets) = scheduler();
        let hints = scheduler.staffing_recommendations(&StaffingInput {
            waiting_count: 20,
            upcoming_appointments_2h: 1,
            active_specialists: 2,
            moving_average_wait_minutes: 10.0,
        });
        assert!(hints.contains(&StaffingHint::Overload));
    }

    #[test]
    fn staffing_hints_flag_overstaffed() {
        let (scheduler, _appointments, _tickets) = scheduler();
        let hints = scheduler.staffing_recommendations(&StaffingInput {
            waiting_count: 0,
            upcoming_appointments_2h: 1,
            active_specialists: 3,
            moving_average_wait_minutes: 5.0,
        });
        assert!(hints.contains(&StaffingHint::Overstaffed));
    }
}
