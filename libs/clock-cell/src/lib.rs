use std::sync::atomic::{AtomicI64, Ordering};
use chrono::{DateTime, Utc};

/// Injectable time source. Every component that reads the wall clock
/// (`WaitPredictor`, `HybridScheduler`, the periodic sweep tasks) takes a
/// `Arc<dyn Clock>` instead of calling `Utc::now()` directly, so tests can
/// pin time without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests. Stores the current instant as epoch
/// millis so it can be shared across threads via `&self` (no interior
/// `Mutex` needed for a single integer).
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(at.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta: chrono::Duration) {
        self.millis.fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .expect("FixedClock holds a valid timestamp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_holds_value() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
    }

    #[test]
    fn fixed_clock_advances() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), at + chrono::Duration::minutes(5));
    }

    #[test]
    fn system_clock_is_close_to_now() {
        let clock = SystemClock;
        let delta = (Utc::now() - clock.now()).num_seconds().abs();
        assert!(delta < 2);
    }
}
