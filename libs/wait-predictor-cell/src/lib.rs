use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;
use uuid::Uuid;

use service_time_store_cell::ServiceTimeSample;

const DEFAULT_BASE_MEAN: f64 = 15.0;
const MIN_SAMPLES_FOR_BASE_MEAN: usize = 5;
const MIN_ESTIMATE: u32 = 1;
const MAX_ESTIMATE: u32 = 180;

/// Remaining time of the ticket currently `serving`, used for the position-1
/// edge case (spec §4.3).
#[derive(Debug, Clone, Copy)]
pub struct RemainingService {
    pub expected_duration_minutes: f64,
    pub elapsed_minutes: f64,
}

/// Everything the predictor needs to produce one estimate. Built by the
/// caller (`QueueEngine`) from a queue snapshot and a `ServiceTimeStore`
/// query; the predictor itself performs no I/O and reads no clock other
/// than `now`.
pub struct PredictionRequest<'a> {
    pub position: u32,
    /// Samples from the last 30 days for this shop.
    pub samples: &'a [ServiceTimeSample],
    pub active_specialists: u32,
    pub now: DateTime<Utc>,
    pub service_id: Option<Uuid>,
    pub specialist_id: Option<Uuid>,
    pub serving: Option<RemainingService>,
}

/// Per-factor breakdown of an estimate, kept around (not just the final
/// integer) so callers can log or display each multiplier.
#[derive(Debug, Clone, Serialize)]
pub struct WaitBreakdown {
    pub base_mean: f64,
    pub hour_factor: f64,
    pub weekday_factor: f64,
    pub service_factor: f64,
    pub specialist_factor: f64,
    pub speed_factor: Option<f64>,
    pub parallelism_divisor: f64,
    pub confidence: f64,
    pub estimate_minutes: u32,
}

pub fn predict(req: &PredictionRequest) -> WaitBreakdown {
    if req.position == 0 {
        return WaitBreakdown {
            base_mean: 0.0,
            hour_factor: 1.0,
            weekday_factor: 1.0,
            service_factor: 1.0,
            specialist_factor: 1.0,
            speed_factor: None,
            parallelism_divisor: 1.0,
            confidence: 0.0,
            estimate_minutes: 0,
        };
    }

    if req.position == 1 {
        if let Some(remaining) = req.serving {
            let minutes = (remaining.expected_duration_minutes - remaining.elapsed_minutes).max(1.0);
            return WaitBreakdown {
                base_mean: remaining.expected_duration_minutes,
                hour_factor: 1.0,
                weekday_factor: 1.0,
                service_factor: 1.0,
                specialist_factor: 1.0,
                speed_factor: None,
                parallelism_divisor: 1.0,
                confidence: 0.9,
                estimate_minutes: clamp_minutes(minutes),
            };
        }
    }

    let valid: Vec<&ServiceTimeSample> = req
        .samples
        .iter()
        .filter(|s| s.duration_minutes > 0.0 && s.duration_minutes < 180.0)
        .collect();

    let base_mean = if valid.len() >= MIN_SAMPLES_FOR_BASE_MEAN {
        mean(valid.iter().map(|s| s.duration_minutes))
    } else {
        DEFAULT_BASE_MEAN
    };

    let hour = req.now.hour() as u8;
    let weekday = req.now.weekday().num_days_from_monday() as u8;

    let hour_factor = factor_for(
        valid.iter().filter(|s| s.hour == hour).map(|s| s.duration_minutes),
        base_mean,
        0.8,
        1.2,
    );
    let weekday_factor = factor_for(
        valid.iter().filter(|s| s.weekday == weekday).map(|s| s.duration_minutes),
        base_mean,
        0.9,
        1.1,
    );

    let service_factor = match req.service_id {
        Some(service_id) => factor_for(
            valid
                .iter()
                .filter(|s| s.service_id == Some(service_id))
                .map(|s| s.duration_minutes),
            base_mean,
            0.8,
            1.2,
        ),
        None => 1.0,
    };

    let specialist_factor = match req.specialist_id {
        Some(specialist_id) => factor_for(
            valid
                .iter()
                .filter(|s| s.specialist_id == Some(specialist_id))
                .map(|s| s.duration_minutes),
            base_mean,
            0.8,
            1.2,
        ),
        None => 1.0,
    };

    let last_hour: Vec<f64> = valid
        .iter()
        .filter(|s| s.observed_at >= req.now - chrono::Duration::hours(1))
        .map(|s| s.duration_minutes)
        .collect();

    let speed_factor = if last_hour.len() >= 3 {
        let recent_mean = mean(last_hour.iter().copied());
        Some((base_mean / recent_mean).clamp(0.5, 2.0))
    } else {
        None
    };

    let mut raw = (req.position as f64 - 1.0) * base_mean * hour_factor * weekday_factor * service_factor * specialist_factor;

    if let Some(speed) = speed_factor {
        raw = 0.7 * raw + 0.3 * raw / speed;
    }

    let parallelism_divisor = if req.active_specialists > 1 {
        1.0 + 0.7 * (req.active_specialists as f64 - 1.0)
    } else {
        1.0
    };
    raw /= parallelism_divisor;

    let confidence = confidence_score(valid.len(), req.position, &valid, base_mean, speed_factor.is_some());

    WaitBreakdown {
        base_mean,
        hour_factor,
        weekday_factor,
        service_factor,
        specialist_factor,
        speed_factor,
        parallelism_divisor,
        confidence,
        estimate_minutes: clamp_minutes(raw.round()),
    }
}

fn clamp_minutes(value: f64) -> u32 {
    value.clamp(MIN_ESTIMATE as f64, MAX_ESTIMATE as f64) as u32
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn factor_for(values: impl Iterator<Item = f64>, base_mean: f64, lo: f64, hi: f64) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() || base_mean <= 0.0 {
        return 1.0;
    }
    (mean(values.into_iter()) / base_mean).clamp(lo, hi)
}

fn confidence_score(
    sample_count: usize,
    position: u32,
    valid: &[&ServiceTimeSample],
    base_mean: f64,
    has_speed_data: bool,
) -> f64 {
    // Logarithmic ramp to 1.0 at 50 samples.
    let sample_score = if sample_count == 0 {
        0.0
    } else {
        ((sample_count as f64).ln() / (50.0_f64).ln()).min(1.0)
    };

    let position_penalty = (0.02 * position as f64).min(0.30);

    let stddev_ratio = if valid.len() >= 2 && base_mean > 0.0 {
        let mean_v = mean(valid.iter().map(|s| s.duration_minutes));
        let variance = valid
            .iter()
            .map(|s| (s.duration_minutes - mean_v).powi(2))
            .sum::<f64>()
            / valid.len() as f64;
        variance.sqrt() / base_mean
    } else {
        0.0
    };
    let stddev_penalty = (0.10 * stddev_ratio).min(0.30);

    let mut score = sample_score - position_penalty - stddev_penalty;
    if has_speed_data {
        score += 0.1;
    }

    score.clamp(0.0, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(minutes: f64, hour: u8, weekday: u8, observed_at: DateTime<Utc>) -> ServiceTimeSample {
        ServiceTimeSample {
            shop_id: Uuid::nil(),
            service_id: None,
            specialist_id: None,
            hour,
            weekday,
            duration_minutes: minutes,
            observed_at,
        }
    }

    #[test]
    fn position_zero_is_zero_minutes() {
        let now = Utc::now();
        let req = PredictionRequest {
            position: 0,
            samples: &[],
            active_specialists: 1,
            now,
            service_id: None,
            specialist_id: None,
            serving: None,
        };
        assert_eq!(predict(&req).estimate_minutes, 0);
    }

    #[test]
    fn falls_back_to_default_base_mean_with_few_samples() {
        let now = Utc::now();
        let samples = vec![sample(10.0, now.hour() as u8, 0, now)];
        let req = PredictionRequest {
            position: 2,
            samples: &samples,
            active_specialists: 1,
            now,
            service_id: None,
            specialist_id: None,
            serving: None,
        };
        let result = predict(&req);
        assert_eq!(result.base_mean, DEFAULT_BASE_MEAN);
        assert_eq!(result.estimate_minutes, 15);
    }

    #[test]
    fn matches_worked_example_scenario_five() {
        // base mean 20, recent mean 10 (5 samples), position 3, 1 specialist.
        // expected ~= 2 * 20 * (0.7 + 0.3*0.5) = 34 minutes (+-10%).
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap();
        let mut samples = Vec::new();
        for _ in 0..10 {
            samples.push(sample(20.0, 14, now.weekday().num_days_from_monday() as u8, now - chrono::Duration::days(2)));
        }
        for _ in 0..5 {
            samples.push(sample(10.0, 14, now.weekday().num_days_from_monday() as u8, now - chrono::Duration::minutes(30)));
        }

        let req = PredictionRequest {
            position: 3,
            samples: &samples,
            active_specialists: 1,
            now,
            service_id: None,
            specialist_id: None,
            serving: None,
        };
        let result = predict(&req);
        let expected = 34.0;
        let tolerance = expected * 0.10;
        assert!(
            (result.estimate_minutes as f64 - expected).abs() <= tolerance,
            "got {} expected ~{}",
            result.estimate_minutes,
            expected
        );
    }

    #[test]
    fn parallelism_reduces_estimate() {
        let now = Utc::now();
        let mut samples = Vec::new();
        for _ in 0..10 {
            samples.push(sample(20.0, now.hour() as u8, now.weekday().num_days_from_monday() as u8, now));
        }
        let single = predict(&PredictionRequest {
            position: 4,
            samples: &samples,
            active_specialists: 1,
            now,
            service_id: None,
            specialist_id: None,
            serving: None,
        });
        let parallel = predict(&PredictionRequest {
            position: 4,
            samples: &samples,
            active_specialists: 3,
            now,
            service_id: None,
            specialist_id: None,
            serving: None,
        });
        assert!(parallel.estimate_minutes < single.estimate_minutes);
    }

    #[test]
    fn position_one_uses_remaining_service_time() {
        let now = Utc::now();
        let req = PredictionRequest {
            position: 1,
            samples: &[],
            active_specialists: 1,
            now,
            service_id: None,
            specialist_id: None,
            serving: Some(RemainingService {
                expected_duration_minutes: 20.0,
                elapsed_minutes: 15.0,
            }),
        };
        assert_eq!(predict(&req).estimate_minutes, 5);
    }

    #[test]
    fn estimate_is_clamped_to_valid_range() {
        let now = Utc::now();
        let mut samples = Vec::new();
        for _ in 0..10 {
            samples.push(sample(179.0, now.hour() as u8, now.weekday().num_days_from_monday() as u8, now));
        }
        let result = predict(&PredictionRequest {
            position: 50,
            samples: &samples,
            active_specialists: 1,
            now,
            service_id: None,
            specialist_id: None,
            serving: None,
        });
        assert!(result.estimate_minutes <= 180);
    }
}
