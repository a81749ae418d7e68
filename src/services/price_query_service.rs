use std::sync::Arc;

use chrono::TimeDelta;

use crate::db::{ price_reading, HourlyBucket, PriceStore };
use crate::error::{ AppError, Result };
use crate::tokens::normalize_token;

pub const DEFAULT_SERIES_LIMIT: u64 = 48;
const MAX_SERIES_LIMIT: u64 = 500;
const DEFAULT_WINDOW: &str = "24h";

/// Read-only access to recorded prices. Never reaches the price provider.
#[derive(Clone)]
pub struct PriceQueryService {
    store: Arc<dyn PriceStore>,
}

impl PriceQueryService {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }

    pub async fn latest(&self, token: &str) -> Result<price_reading::Model> {
        let token = required_token(token)?;
        self.store
            .latest(&token).await?
            .ok_or_else(|| AppError::NotFound(format!("No price recorded for {}", token)))
    }

    pub async fn series(&self, token: &str, limit: Option<u64>) -> Result<Vec<price_reading::Model>> {
        let token = required_token(token)?;
        let limit = limit.unwrap_or(DEFAULT_SERIES_LIMIT).clamp(1, MAX_SERIES_LIMIT);
        self.store.series(&token, limit).await
    }

    pub async fn hourly(&self, window: Option<&str>) -> Result<Vec<HourlyBucket>> {
        let window = parse_window(window.unwrap_or(DEFAULT_WINDOW))?;
        self.store.hourly_average(window).await
    }
}

fn required_token(token: &str) -> Result<String> {
    let token = normalize_token(token);
    if token.is_empty() {
        return Err(AppError::validation("token", "token query parameter is required"));
    }
    Ok(token)
}

/// Parse `<n>m`, `<n>h` or `<n>d`, between one hour and one week.
pub fn parse_window(value: &str) -> Result<TimeDelta> {
    let invalid = || AppError::validation("window", format!("'{}' is not a window like 24h, 90m or 2d", value));

    let value = value.trim();
    if value.len() < 2 || !value.is_char_boundary(value.len() - 1) {
        return Err(invalid());
    }
    let (amount, unit) = value.split_at(value.len() - 1);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;

    let window = match unit {
        "m" => TimeDelta::try_minutes(amount),
        "h" => TimeDelta::try_hours(amount),
        "d" => TimeDelta::try_days(amount),
        _ => None,
    }.ok_or_else(invalid)?;

    if window < TimeDelta::hours(1) || window > TimeDelta::days(7) {
        return Err(AppError::validation("window", "window must be between 1h and 7d"));
    }

    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryPriceStore;
    use chrono::Utc;

    #[test]
    fn test_parse_window() {
        assert_eq!(parse_window("24h").unwrap(), TimeDelta::hours(24));
        assert_eq!(parse_window("90m").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_window(" 2d ").unwrap(), TimeDelta::days(2));

        for bad in ["", "h", "24", "24x", "-3h", "30m", "8d", "1.5h"] {
            assert!(parse_window(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[tokio::test]
    async fn test_latest_missing_token_is_not_found() {
        let service = PriceQueryService::new(Arc::new(MemoryPriceStore::new()));

        assert!(matches!(service.latest("ETH").await, Err(AppError::NotFound(_))));
        assert!(matches!(service.latest(" ").await, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_series_limit_defaults_and_clamps() {
        let store = Arc::new(MemoryPriceStore::new());
        let start = Utc::now() - TimeDelta::days(1);
        for i in 0..60 {
            store.record("ETH", (3000 + i).into(), start + TimeDelta::minutes(i)).await.unwrap();
        }
        let service = PriceQueryService::new(store);

        assert_eq!(service.series("eth", None).await.unwrap().len(), 48);
        assert_eq!(service.series("ETH", Some(0)).await.unwrap().len(), 1);
        assert_eq!(service.series("ETH", Some(10_000)).await.unwrap().len(), 60);
    }
}
