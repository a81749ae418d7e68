use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Price provider unreachable, rate limited or returned something unparseable.
    #[error("Price fetch error: {0}")] Fetch(String),

    #[error("Store error: {0}")] Store(String),

    #[error("Database error: {0}")] Database(#[from] sea_orm::DbErr),

    #[error("Invalid {field}: {message}")] Validation {
        field: String,
        message: String,
    },

    #[error("Not found: {0}")] NotFound(String),

    #[error("Notification error: {0}")] Notify(String),

    #[error("Configuration error: {0}")] Config(String),

    #[error("Internal error: {0}")] Internal(String),
}

#[derive(serde::Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(serde::Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        let (code, message, field) = match self {
            AppError::Fetch(msg) => ("FETCH_ERROR", msg.clone(), None),
            AppError::Store(msg) => ("STORE_ERROR", msg.clone(), None),
            AppError::Database(e) => ("STORE_ERROR", e.to_string(), None),
            AppError::Validation { field, message } =>
                ("VALIDATION_ERROR", message.clone(), Some(field.clone())),
            AppError::NotFound(msg) => ("NOT_FOUND", msg.clone(), None),
            AppError::Notify(msg) => ("NOTIFY_ERROR", msg.clone(), None),
            AppError::Config(msg) => ("CONFIG_ERROR", msg.clone(), None),
            AppError::Internal(msg) => ("INTERNAL_ERROR", msg.clone(), None),
        };

        ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                field,
            },
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => axum::http::StatusCode::NOT_FOUND,
            AppError::Validation { .. } => axum::http::StatusCode::BAD_REQUEST,
            _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Validation problems are caller mistakes, not system faults
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let response = self.to_error_response();
        (status, axum::Json(response)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_validation_maps_to_bad_request_with_field() {
        let err = AppError::validation("email", "Enter a valid email address");
        let body = err.to_error_response();

        assert_eq!(body.error.code, "VALIDATION_ERROR");
        assert_eq!(body.error.field.as_deref(), Some("email"));
        assert_eq!(err.into_response().status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_and_store_status_codes() {
        let not_found = AppError::NotFound("No readings for ETH".to_string());
        assert_eq!(not_found.into_response().status(), axum::http::StatusCode::NOT_FOUND);

        let store = AppError::Store("connection reset".to_string());
        assert_eq!(store.into_response().status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_timed_out_steps_keep_their_step_code() {
        let fetch = AppError::Fetch("price request timed out".to_string());
        let notify = AppError::Notify("send timed out".to_string());

        assert_eq!(fetch.to_error_response().error.code, "FETCH_ERROR");
        assert_eq!(notify.to_error_response().error.code, "NOTIFY_ERROR");
    }
}
