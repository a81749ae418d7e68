use std::sync::atomic::{ AtomicI64, Ordering };

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use sea_orm::prelude::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::alert_store::{ AlertStore, NewSubscription };
use crate::db::entity::{ alert_subscription, price_reading };
use crate::db::price_store::PriceStore;
use crate::error::Result;
use crate::tokens::normalize_token;

/// In-process price store with the same ordering rules as the Postgres one.
#[derive(Default)]
pub struct MemoryPriceStore {
    readings: RwLock<Vec<price_reading::Model>>,
    next_id: AtomicI64,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.readings.read().await.is_empty()
    }

    async fn newest_first(&self, token: &str) -> Vec<price_reading::Model> {
        let token = normalize_token(token);
        let mut matching: Vec<price_reading::Model> = self.readings
            .read().await
            .iter()
            .filter(|r| r.token == token)
            .cloned()
            .collect();

        matching.sort_by(|a, b| (b.observed_at, b.id).cmp(&(a.observed_at, a.id)));
        matching
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn record(&self, token: &str, price: Decimal, observed_at: DateTime<Utc>) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.readings.write().await.push(price_reading::Model {
            id,
            token: normalize_token(token),
            price,
            observed_at,
        });
        Ok(())
    }

    async fn latest(&self, token: &str) -> Result<Option<price_reading::Model>> {
        Ok(self.newest_first(token).await.into_iter().next())
    }

    async fn series(&self, token: &str, limit: u64) -> Result<Vec<price_reading::Model>> {
        let mut readings = self.newest_first(token).await;
        readings.truncate(limit as usize);
        Ok(readings)
    }

    async fn readings_since(&self, since: DateTime<Utc>) -> Result<Vec<price_reading::Model>> {
        Ok(
            self.readings
                .read().await
                .iter()
                .filter(|r| r.observed_at >= since)
                .cloned()
                .collect()
        )
    }
}

#[derive(Default)]
pub struct MemoryAlertStore {
    subscriptions: RwLock<Vec<alert_subscription::Model>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn create(&self, subscription: NewSubscription) -> Result<alert_subscription::Model> {
        let model = alert_subscription::Model {
            id: Uuid::new_v4(),
            token: subscription.token,
            threshold_usd: subscription.threshold_usd,
            email: subscription.email,
            created_at: Utc::now(),
        };
        self.subscriptions.write().await.push(model.clone());
        Ok(model)
    }

    async fn list_for_token(&self, token: &str) -> Result<Vec<alert_subscription::Model>> {
        let token = normalize_token(token);
        Ok(
            self.subscriptions
                .read().await
                .iter()
                .filter(|s| s.token == token)
                .cloned()
                .collect()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{ TimeDelta, TimeZone };

    fn usd(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[tokio::test]
    async fn test_latest_prefers_timestamp_then_insertion_order() {
        let store = MemoryPriceStore::new();
        let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let t2 = t1 + TimeDelta::minutes(5);

        store.record("ETH", usd("3100"), t2).await.unwrap();
        store.record("ETH", usd("3000"), t1).await.unwrap();
        assert_eq!(store.latest("eth").await.unwrap().unwrap().price, usd("3100"));

        store.record("ETH", usd("3150"), t2).await.unwrap();
        assert_eq!(store.latest("ETH").await.unwrap().unwrap().price, usd("3150"));
        assert!(store.latest("MATIC").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_series_is_bounded_and_newest_first() {
        let store = MemoryPriceStore::new();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        for i in 0..60 {
            store.record("ETH", Decimal::from(3000 + i), start + TimeDelta::minutes(5 * i)).await.unwrap();
        }

        let series = store.series("ETH", 48).await.unwrap();
        assert_eq!(series.len(), 48);
        assert_eq!(series[0].price, Decimal::from(3059));
        assert!(series.windows(2).all(|w| w[0].observed_at > w[1].observed_at));
    }

    #[tokio::test]
    async fn test_hourly_average_only_covers_window() {
        let store = MemoryPriceStore::new();
        let now = Utc::now();

        store.record("ETH", usd("1000"), now - TimeDelta::hours(30)).await.unwrap();
        store.record("ETH", usd("3000"), now).await.unwrap();

        let buckets = store.hourly_average(TimeDelta::hours(24)).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].avg_price, usd("3000"));
    }

    #[tokio::test]
    async fn test_subscriptions_round_trip() {
        let store = MemoryAlertStore::new();
        let created = store
            .create(NewSubscription::parse("eth", usd("2500"), "a@example.com").unwrap()).await
            .unwrap();

        let listed = store.list_for_token("ETH").await.unwrap();
        assert_eq!(listed, vec![created]);
        assert!(store.list_for_token("MATIC").await.unwrap().is_empty());
    }
}
