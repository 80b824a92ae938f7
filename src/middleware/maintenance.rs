use axum::{extract::Request, middleware::Next, response::Response};
use axum::response::IntoResponse;

use crate::error::ApiError;

/// Answers every request with 503 while the server is in maintenance mode
pub async fn maintenance_middleware(request: Request, _next: Next) -> Response {
    tracing::debug!("Maintenance mode: refusing {} {}", request.method(), request.uri().path());
    ApiError::ServiceUnavailable.into_response()
}
