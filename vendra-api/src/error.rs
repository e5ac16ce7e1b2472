use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use vendra_core::CoreError;

/// Client-facing error mapping for the §7 taxonomy: business-rule and
/// validation failures are terminal 4xx; infrastructure faults surface
/// as retryable 429/503/502 so callers can back off and retry.
#[derive(Debug)]
pub struct AppError(pub CoreError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retryable = self.0.is_retryable();
        let status = match &self.0 {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::OutOfStock { .. }
            | CoreError::InvalidTransition { .. }
            | CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            CoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Provider(_) => StatusCode::BAD_GATEWAY,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}
