use axum::{ routing::{ get, post }, Router };
use tower::ServiceBuilder;
use tower_http::{ cors::CorsLayer, trace::TraceLayer };

pub mod alerts;
pub mod prices;
pub mod status;

use crate::scheduler::StatusHandle;
use crate::services::{ AlertService, PriceQueryService };

#[derive(Clone)]
pub struct AppState {
    pub alert_service: AlertService,
    pub price_query_service: PriceQueryService,
    pub scheduler_status: StatusHandle,
}

impl AppState {
    pub fn new(
        alert_service: AlertService,
        price_query_service: PriceQueryService,
        scheduler_status: StatusHandle
    ) -> Self {
        Self {
            alert_service,
            price_query_service,
            scheduler_status,
        }
    }
}

/// HTTP surface. Read-only apart from alert creation; nothing here starts a
/// price cycle.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(status::health_check))
        .route("/scheduler/status", get(status::scheduler_status))
        .route("/alerts", post(alerts::create_alert))
        .route("/prices/latest", get(prices::latest))
        .route("/prices/series", get(prices::series))
        .route("/prices/hourly", get(prices::hourly))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
}
