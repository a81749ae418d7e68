use axum::{ extract::State, Json };

use crate::scheduler::SchedulerStatus;

use super::AppState;

pub async fn health_check() -> &'static str {
    "OK"
}

/// Progress of the background price scheduler; never starts a cycle itself.
pub async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler_status.snapshot().await)
}
