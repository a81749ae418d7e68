use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    prelude::Decimal,
    ActiveModelTrait,
    ActiveValue,
    ColumnTrait,
    DatabaseConnection,
    EntityTrait,
    QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

use crate::db::entity::alert_subscription;
use crate::error::{ AppError, Result };
use crate::tokens::normalize_token;

lazy_static! {
    static ref EMAIL_SHAPE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();

    /// First value that no longer fits the 20 integer digits of NUMERIC(38,18).
    static ref THRESHOLD_LIMIT: Decimal = Decimal::from_i128_with_scale(10_i128.pow(20), 0);
}

/// A subscription that passed validation and is ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubscription {
    pub token: String,
    pub threshold_usd: Decimal,
    pub email: String,
}

impl NewSubscription {
    pub fn parse(token: &str, threshold_usd: Decimal, email: &str) -> Result<Self> {
        let token = normalize_token(token);
        if token.is_empty() {
            return Err(AppError::validation("token", "Token is required"));
        }

        if threshold_usd <= Decimal::ZERO {
            return Err(AppError::validation("thresholdUsd", "Threshold must be a positive USD amount"));
        }
        if threshold_usd >= *THRESHOLD_LIMIT {
            return Err(AppError::validation("thresholdUsd", "Threshold is too large"));
        }

        let email = email.trim();
        if !EMAIL_SHAPE.is_match(email) {
            return Err(AppError::validation("email", "Enter a valid email address"));
        }

        Ok(Self {
            token,
            threshold_usd: threshold_usd.normalize(),
            email: email.to_string(),
        })
    }
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create(&self, subscription: NewSubscription) -> Result<alert_subscription::Model>;

    /// Every subscription for `token`, in no particular order.
    async fn list_for_token(&self, token: &str) -> Result<Vec<alert_subscription::Model>>;
}

/// Postgres-backed subscription store.
#[derive(Clone)]
pub struct AlertRepository {
    db: Arc<DatabaseConnection>,
}

impl AlertRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AlertStore for AlertRepository {
    async fn create(&self, subscription: NewSubscription) -> Result<alert_subscription::Model> {
        let model = alert_subscription::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            token: ActiveValue::Set(subscription.token),
            threshold_usd: ActiveValue::Set(subscription.threshold_usd),
            email: ActiveValue::Set(subscription.email),
            created_at: ActiveValue::Set(Utc::now()),
        };

        let model = model.insert(self.db.as_ref()).await?;
        Ok(model)
    }

    async fn list_for_token(&self, token: &str) -> Result<Vec<alert_subscription::Model>> {
        let subscriptions = alert_subscription::Entity
            ::find()
            .filter(alert_subscription::Column::Token.eq(normalize_token(token)))
            .order_by_asc(alert_subscription::Column::CreatedAt)
            .all(self.db.as_ref()).await?;
        Ok(subscriptions)
    }
}
