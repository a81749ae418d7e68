use std::str::FromStr;

use axum::{ extract::{ rejection::JsonRejection, State }, http::StatusCode, Json };
use chrono::{ DateTime, Utc };
use sea_orm::prelude::Decimal;
use serde::{ Deserialize, Serialize };
use uuid::Uuid;

use crate::db::alert_subscription;
use crate::error::{ AppError, Result };

use super::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertRequest {
    #[serde(default)]
    pub token: String,
    /// JSON number or decimal string; parsed exactly.
    #[serde(default)]
    pub threshold_usd: serde_json::Value,
    #[serde(default)]
    pub email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertResponse {
    pub id: Uuid,
    pub token: String,
    pub threshold_usd: Decimal,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<alert_subscription::Model> for AlertResponse {
    fn from(sub: alert_subscription::Model) -> Self {
        Self {
            id: sub.id,
            token: sub.token,
            threshold_usd: sub.threshold_usd,
            email: sub.email,
            created_at: sub.created_at,
        }
    }
}

pub async fn create_alert(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateAlertRequest>, JsonRejection>
) -> Result<(StatusCode, Json<AlertResponse>)> {
    let Json(request) = payload.map_err(|e| AppError::validation("body", e.body_text()))?;

    let threshold_usd = parse_threshold(&request.threshold_usd)?;
    let created = state.alert_service.create(&request.token, threshold_usd, &request.email).await?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

fn parse_threshold(value: &serde_json::Value) -> Result<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => {
            return Err(AppError::validation("thresholdUsd", "Threshold must be a number"));
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| AppError::validation("thresholdUsd", "Threshold must be a number"))
}
