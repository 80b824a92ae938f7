use axum::response::IntoResponse;
use serde_json::json;

use crate::middleware::Envelope;

/// GET / - service name and version
pub async fn index() -> impl IntoResponse {
    Envelope::ok(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Anything unmatched, and the unclaimed custom route slot
pub async fn not_found() -> impl IntoResponse {
    crate::error::ApiError::NotFound
}
