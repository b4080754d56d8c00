use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ServiceTimeStoreError;
use crate::models::ServiceTimeSample;

/// Append-only log of completed service durations, indexed by shop so
/// `WaitPredictor` and `HybridScheduler` can pull a shop's recent history
/// without scanning every sample ever recorded.
#[async_trait]
pub trait ServiceTimeStore: Send + Sync {
    async fn insert(&self, sample: ServiceTimeSample) -> Result<(), ServiceTimeStoreError>;

    /// All valid samples for a shop observed at or after `since`.
    async fn recent(&self, shop_id: Uuid, since: DateTime<Utc>) -> Vec<ServiceTimeSample>;

    /// The most recent `n` samples for a shop, newest last.
    async fn last_n_completed(&self, shop_id: Uuid, n: usize) -> Vec<ServiceTimeSample>;
}

#[derive(Default)]
pub struct InMemoryServiceTimeStore {
    by_shop: RwLock<HashMap<Uuid, Vec<ServiceTimeSample>>>,
}

impl InMemoryServiceTimeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceTimeStore for InMemoryServiceTimeStore {
    async fn insert(&self, sample: ServiceTimeSample) -> Result<(), ServiceTimeStoreError> {
        if !sample.is_valid() {
            warn!(
                shop_id = %sample.shop_id,
                duration = sample.duration_minutes,
                "dropping out-of-range service time sample"
            );
            return Err(ServiceTimeStoreError::InvalidDuration(sample.duration_minutes));
        }

        let mut by_shop = self.by_shop.write().await;
        let entries = by_shop.entry(sample.shop_id).or_default();
        entries.push(sample);
        debug!(total = entries.len(), "service time sample recorded");
        Ok(())
    }

    async fn recent(&self, shop_id: Uuid, since: DateTime<Utc>) -> Vec<ServiceTimeSample> {
        let by_shop = self.by_shop.read().await;
        by_shop
            .get(&shop_id)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.observed_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn last_n_completed(&self, shop_id: Uuid, n: usize) -> Vec<ServiceTimeSample> {
        let by_shop = self.by_shop.read().await;
        by_shop
            .get(&shop_id)
            .map(|samples| {
                let start = samples.len().saturating_sub(n);
                samples[start..].to_vec()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(shop: Uuid, minutes: f64, observed_at: DateTime<Utc>) -> ServiceTimeSample {
        ServiceTimeSample::new(shop, None, None, minutes, observed_at)
    }

    #[tokio::test]
    async fn rejects_out_of_range_durations() {
        let store = InMemoryServiceTimeStore::new();
        let shop = Uuid::new_v4();
        let result = store.insert(sample(shop, 200.0, Utc::now())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn recent_filters_by_window() {
        let store = InMemoryServiceTimeStore::new();
        let shop = Uuid::new_v4();
        let now = Utc::now();
        store.insert(sample(shop, 10.0, now - Duration::days(40))).await.unwrap();
        store.insert(sample(shop, 12.0, now - Duration::days(1))).await.unwrap();

        let recent = store.recent(shop, now - Duration::days(30)).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].duration_minutes, 12.0);
    }

    #[tokio::test]
    async fn last_n_completed_returns_tail() {
        let store = InMemoryServiceTimeStore::new();
        let shop = Uuid::new_v4();
        let now = Utc::now();
        for i in 0..5 {
            store.insert(sample(shop, 10.0 + i as f64, now)).await.unwrap();
        }

        let last_two = store.last_n_completed(shop, 2).await;
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[1].duration_minutes, 14.0);
    }
}
