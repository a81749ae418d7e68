use std::collections::BTreeMap;
use std::cmp::Reverse;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{ DateTime, DurationRound, TimeDelta, Utc };
use sea_orm::{
    prelude::Decimal,
    ActiveValue,
    ColumnTrait,
    DatabaseConnection,
    EntityTrait,
    QueryFilter,
    QueryOrder,
    QuerySelect,
};
use serde::Serialize;

use crate::db::entity::price_reading;
use crate::error::{ AppError, Result };
use crate::tokens::normalize_token;

/// Average price of one token over one UTC calendar hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyBucket {
    pub token: String,
    pub hour: DateTime<Utc>,
    pub avg_price: Decimal,
}

/// Append-only log of price readings.
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn record(&self, token: &str, price: Decimal, observed_at: DateTime<Utc>) -> Result<()>;

    /// Reading with the greatest `observed_at`, ties going to the last inserted.
    async fn latest(&self, token: &str) -> Result<Option<price_reading::Model>>;

    /// Newest first, at most `limit` readings.
    async fn series(&self, token: &str, limit: u64) -> Result<Vec<price_reading::Model>>;

    /// All readings observed at or after `since`, any token.
    async fn readings_since(&self, since: DateTime<Utc>) -> Result<Vec<price_reading::Model>>;

    /// Per-token hourly averages over the trailing `window`, newest hour first.
    async fn hourly_average(&self, window: TimeDelta) -> Result<Vec<HourlyBucket>> {
        let readings = self.readings_since(Utc::now() - window).await?;
        aggregate_hourly(&readings)
    }
}

/// Group readings by (UTC hour, token) and average them exactly.
pub fn aggregate_hourly(readings: &[price_reading::Model]) -> Result<Vec<HourlyBucket>> {
    let mut groups: BTreeMap<(Reverse<DateTime<Utc>>, &str), (Decimal, u32)> = BTreeMap::new();

    for reading in readings {
        let hour = reading.observed_at
            .duration_trunc(TimeDelta::hours(1))
            .map_err(|e| AppError::Internal(format!("Cannot truncate timestamp: {}", e)))?;

        let entry = groups.entry((Reverse(hour), reading.token.as_str())).or_insert((Decimal::ZERO, 0));
        entry.0 += reading.price;
        entry.1 += 1;
    }

    Ok(
        groups
            .into_iter()
            .map(|((Reverse(hour), token), (sum, count))| HourlyBucket {
                token: token.to_string(),
                hour,
                avg_price: (sum / Decimal::from(count)).round_dp(18).normalize(),
            })
            .collect()
    )
}

/// Postgres-backed price store.
#[derive(Clone)]
pub struct PriceRepository {
    db: Arc<DatabaseConnection>,
}

impl PriceRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PriceStore for PriceRepository {
    async fn record(&self, token: &str, price: Decimal, observed_at: DateTime<Utc>) -> Result<()> {
        let reading = price_reading::ActiveModel {
            id: ActiveValue::NotSet,
            token: ActiveValue::Set(normalize_token(token)),
            price: ActiveValue::Set(price),
            observed_at: ActiveValue::Set(observed_at),
        };

        price_reading::Entity::insert(reading).exec(self.db.as_ref()).await?;
        Ok(())
    }

    async fn latest(&self, token: &str) -> Result<Option<price_reading::Model>> {
        let reading = price_reading::Entity
            ::find()
            .filter(price_reading::Column::Token.eq(normalize_token(token)))
            .order_by_desc(price_reading::Column::ObservedAt)
            .order_by_desc(price_reading::Column::Id)
            .one(self.db.as_ref()).await?;
        Ok(reading)
    }

    async fn series(&self, token: &str, limit: u64) -> Result<Vec<price_reading::Model>> {
        let readings = price_reading::Entity
            ::find()
            .filter(price_reading::Column::Token.eq(normalize_token(token)))
            .order_by_desc(price_reading::Column::ObservedAt)
            .order_by_desc(price_reading::Column::Id)
            .limit(limit)
            .all(self.db.as_ref()).await?;
        Ok(readings)
    }

    async fn readings_since(&self, since: DateTime<Utc>) -> Result<Vec<price_reading::Model>> {
        let readings = price_reading::Entity
            ::find()
            .filter(price_reading::Column::ObservedAt.gte(since))
            .order_by_desc(price_reading::Column::ObservedAt)
            .all(self.db.as_ref()).await?;
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(id: i64, token: &str, price: &str, at: DateTime<Utc>) -> price_reading::Model {
        price_reading::Model {
            id,
            token: token.to_string(),
            price: price.parse().unwrap(),
            observed_at: at,
        }
    }

    #[test]
    fn test_aggregate_hourly_groups_by_hour_and_token() {
        let t = |h, m| Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap();
        let readings = vec![
            reading(1, "ETH", "3000.00", t(10, 5)),
            reading(2, "ETH", "3100.00", t(10, 55)),
            reading(3, "MATIC", "0.90", t(10, 30)),
            reading(4, "ETH", "3200.00", t(11, 0))
        ];

        let buckets = aggregate_hourly(&readings).unwrap();

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].hour, t(11, 0));
        assert_eq!(buckets[0].token, "ETH");
        assert_eq!(buckets[0].avg_price, "3200".parse::<Decimal>().unwrap());
        assert_eq!(buckets[1].hour, t(10, 0));
        assert_eq!(buckets[1].token, "ETH");
        assert_eq!(buckets[1].avg_price, "3050".parse::<Decimal>().unwrap());
        assert_eq!(buckets[2].token, "MATIC");
        assert_eq!(buckets[2].avg_price, "0.9".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_aggregate_hourly_keeps_exact_decimals() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let readings = vec![
            reading(1, "ETH", "0.1", at),
            reading(2, "ETH", "0.2", at),
            reading(3, "ETH", "0.3", at)
        ];

        let buckets = aggregate_hourly(&readings).unwrap();
        assert_eq!(buckets[0].avg_price, "0.2".parse::<Decimal>().unwrap());
    }
}
