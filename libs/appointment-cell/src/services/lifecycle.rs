use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::AppointmentError;
use crate::models::AppointmentStatus;

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!(?current_status, ?new_status, "validating appointment status transition");

        let valid_transitions = self.get_valid_transitions(current_status);
        if !valid_transitions.contains(&new_status) {
            warn!(?current_status, ?new_status, "invalid appointment status transition attempted");
            return Err(AppointmentError::InvalidStatusTransition(current_status));
        }

        info!(?current_status, ?new_status, "appointment status transition validated");
        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InProgress => vec![AppointmentStatus::Completed, AppointmentStatus::Cancelled],
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow => vec![],
        }
    }

    /// Mirrors the queue engine's 15-minute-early / 30-minute-late window
    /// used for ticket `called` staleness, scaled to appointment service.
    pub fn can_start(
        &self,
        current_status: AppointmentStatus,
        scheduled_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        if current_status != AppointmentStatus::Confirmed {
            return false;
        }
        let earliest = scheduled_start - Duration::minutes(15);
        let latest = scheduled_start + Duration::minutes(30);
        now >= earliest && now <= latest
    }

    pub fn should_mark_no_show(
        &self,
        current_status: AppointmentStatus,
        scheduled_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        if !matches!(current_status, AppointmentStatus::Confirmed | AppointmentStatus::Scheduled) {
            return false;
        }
        now > scheduled_start + Duration::minutes(30)
    }

    /// Automatic transitions applied by a periodic sweep, analogous to
    /// `cleanup_stale_called` for tickets.
    pub fn automatic_transition(
        &self,
        current_status: AppointmentStatus,
        scheduled_start: DateTime<Utc>,
        scheduled_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Confirmed if self.should_mark_no_show(current_status, scheduled_start, now) => {
                Some(AppointmentStatus::NoShow)
            }
            AppointmentStatus::InProgress if now > scheduled_end + Duration::minutes(30) => {
                Some(AppointmentStatus::Completed)
            }
            _ => None,
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_have_no_transitions() {
        let service = AppointmentLifecycleService::new();
        assert!(service.get_valid_transitions(AppointmentStatus::Completed).is_empty());
        assert!(service.get_valid_transitions(AppointmentStatus::Cancelled).is_empty());
        assert!(service.get_valid_transitions(AppointmentStatus::NoShow).is_empty());
    }

    #[test]
    fn rejects_invalid_transition() {
        let service = AppointmentLifecycleService::new();
        let result = service.validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::InProgress);
        assert!(result.is_err());
    }

    #[test]
    fn marks_no_show_after_grace() {
        let service = AppointmentLifecycleService::new();
        let start = Utc::now() - Duration::minutes(45);
        assert!(service.should_mark_no_show(AppointmentStatus::Confirmed, start, Utc::now()));
    }
}
