use std::sync::Arc;

use sea_orm::prelude::Decimal;

use crate::db::{ alert_subscription, AlertStore, NewSubscription };
use crate::error::Result;

#[derive(Clone)]
pub struct AlertService {
    store: Arc<dyn AlertStore>,
}

impl AlertService {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// Validate and persist a new subscription
    pub async fn create(
        &self,
        token: &str,
        threshold_usd: Decimal,
        email: &str
    ) -> Result<alert_subscription::Model> {
        let subscription = NewSubscription::parse(token, threshold_usd, email)?;
        let created = self.store.create(subscription).await?;

        tracing::info!("Alert subscription {} created for {}", created.id, created.token);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryAlertStore;
    use crate::error::AppError;

    #[tokio::test]
    async fn test_create_persists_normalized_subscription() {
        let store = Arc::new(MemoryAlertStore::new());
        let service = AlertService::new(store.clone());

        let created = service.create("matic", "0.75".parse().unwrap(), "me@example.org").await.unwrap();
        let listed = store.list_for_token("MATIC").await.unwrap();

        assert_eq!(created.token, "MATIC");
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn test_invalid_subscription_is_not_stored() {
        let store = Arc::new(MemoryAlertStore::new());
        let service = AlertService::new(store.clone());

        let result = service.create("ETH", "10".parse().unwrap(), "nope").await;

        assert!(matches!(result, Err(AppError::Validation { .. })));
        assert!(store.list_for_token("ETH").await.unwrap().is_empty());
    }
}
