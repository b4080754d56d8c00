use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One observed service duration, filtered at insert time to `0 < duration < 180`
/// minutes (spec §3). `hour`/`weekday` are denormalized from `observed_at` so
/// `WaitPredictor` can filter on them without re-deriving a timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTimeSample {
    pub shop_id: Uuid,
    pub service_id: Option<Uuid>,
    pub specialist_id: Option<Uuid>,
    pub hour: u8,
    pub weekday: u8,
    pub duration_minutes: f64,
    pub observed_at: DateTime<Utc>,
}

impl ServiceTimeSample {
    pub fn new(
        shop_id: Uuid,
        service_id: Option<Uuid>,
        specialist_id: Option<Uuid>,
        duration_minutes: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        use chrono::{Datelike, Timelike};
        Self {
            shop_id,
            service_id,
            specialist_id,
            hour: observed_at.hour() as u8,
            weekday: observed_at.weekday().num_days_from_monday() as u8,
            duration_minutes,
            observed_at,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.duration_minutes > 0.0 && self.duration_minutes < 180.0
    }
}
