use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppointmentError;
use crate::models::Appointment;

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get_by_id(&self, appointment_id: Uuid) -> Option<Appointment>;

    /// Appointments for a shop with `scheduled_start` in `[window_start, window_end]`.
    async fn list_in_window(
        &self,
        shop_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<Appointment>;

    async fn insert(&self, appointment: Appointment);

    async fn update(&self, appointment: Appointment) -> Result<(), AppointmentError>;
}

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
    by_shop: RwLock<HashMap<Uuid, Vec<Uuid>>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get_by_id(&self, appointment_id: Uuid) -> Option<Appointment> {
        self.appointments.read().await.get(&appointment_id).cloned()
    }

    async fn list_in_window(
        &self,
        shop_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<Appointment> {
        let by_shop = self.by_shop.read().await;
        let appointments = self.appointments.read().await;
        let mut result: Vec<Appointment> = by_shop
            .get(&shop_id)
            .into_iter()
            .flatten()
            .filter_map(|id| appointments.get(id))
            .filter(|a| a.scheduled_start >= window_start && a.scheduled_start <= window_end)
            .cloned()
            .collect();
        result.sort_by_key(|a| a.scheduled_start);
        result
    }

    async fn insert(&self, appointment: Appointment) {
        let mut by_shop = self.by_shop.write().await;
        by_shop.entry(appointment.shop_id).or_default().push(appointment.id);
        self.appointments.write().await.insert(appointment.id, appointment);
    }

    async fn update(&self, appointment: Appointment) -> Result<(), AppointmentError> {
        let mut appointments = self.appointments.write().await;
        if !appointments.contains_key(&appointment.id) {
            return Err(AppointmentError::NotFound(appointment.id));
        }
        appointments.insert(appointment.id, appointment);
        Ok(())
    }
}
