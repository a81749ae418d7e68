use axum::{ extract::{ rejection::QueryRejection, Query, State }, Json };
use chrono::{ DateTime, Utc };
use sea_orm::prelude::Decimal;
use serde::{ Deserialize, Serialize };

use crate::db::HourlyBucket;
use crate::error::{ AppError, Result };

use super::AppState;

#[derive(Deserialize)]
pub struct LatestParams {
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct SeriesParams {
    pub token: Option<String>,
    pub limit: Option<u64>,
}

#[derive(Deserialize)]
pub struct HourlyParams {
    pub window: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestPriceResponse {
    pub token: String,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SeriesResponse {
    pub token: String,
    pub series: Vec<SeriesPoint>,
}

#[derive(Serialize)]
pub struct HourlyResponse {
    pub buckets: Vec<HourlyBucket>,
}

fn query_params<T>(params: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    params
        .map(|Query(p)| p)
        .map_err(|e| AppError::validation("query", e.body_text()))
}

pub async fn latest(
    State(state): State<AppState>,
    params: std::result::Result<Query<LatestParams>, QueryRejection>
) -> Result<Json<LatestPriceResponse>> {
    let params = query_params(params)?;
    let reading = state.price_query_service.latest(params.token.as_deref().unwrap_or_default()).await?;

    Ok(
        Json(LatestPriceResponse {
            token: reading.token,
            price: reading.price,
            observed_at: reading.observed_at,
        })
    )
}

pub async fn series(
    State(state): State<AppState>,
    params: std::result::Result<Query<SeriesParams>, QueryRejection>
) -> Result<Json<SeriesResponse>> {
    let params = query_params(params)?;
    let token = params.token.unwrap_or_default();
    let readings = state.price_query_service.series(&token, params.limit).await?;

    Ok(
        Json(SeriesResponse {
            token: crate::tokens::normalize_token(&token),
            series: readings
                .into_iter()
                .map(|r| SeriesPoint {
                    price: r.price,
                    observed_at: r.observed_at,
                })
                .collect(),
        })
    )
}

pub async fn hourly(
    State(state): State<AppState>,
    params: std::result::Result<Query<HourlyParams>, QueryRejection>
) -> Result<Json<HourlyResponse>> {
    let params = query_params(params)?;
    let buckets = state.price_query_service.hourly(params.window.as_deref()).await?;

    Ok(Json(HourlyResponse { buckets }))
}
