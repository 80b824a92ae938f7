// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse};

use crate::middleware::response::Envelope;

/// Every failure the request pipeline can report to a caller.
/// Each variant maps to exactly one status code and a client-safe message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    // 400 Bad Request (malformed JSON body, query string, etc.)
    BadRequest,

    // 400 Bad Request carrying the first failing field's message
    Validation(String),

    // 400 Bad Request on uniqueness conflicts
    Duplicate(Option<String>),

    // 401 Unauthorized (authentication and authorization failures alike)
    Unauthorized,

    // 404 Not Found (unknown resource, record, verb or misconfigured resource)
    NotFound,

    // 500 Internal Server Error
    InternalServerError,

    // 503 Service Unavailable
    ServiceUnavailable,
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Duplicate(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest => "bad request".to_string(),
            ApiError::Validation(message) => message.clone(),
            ApiError::Duplicate(Some(field)) => {
                format!("{} already exists, try again with a unique value.", field)
            }
            ApiError::Duplicate(None) => "duplicate or empty data provided".to_string(),
            ApiError::Unauthorized => "unauthorized".to_string(),
            ApiError::NotFound => "resource not found".to_string(),
            ApiError::InternalServerError => "internal server error".to_string(),
            ApiError::ServiceUnavailable => "service unavailable".to_string(),
        }
    }

    /// Convert to the response envelope
    pub fn to_envelope(&self) -> Envelope {
        Envelope::error(self.status_code(), self.message())
    }
}

impl From<crate::validation::ValidationError> for ApiError {
    fn from(err: crate::validation::ValidationError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<crate::resource::LookupError> for ApiError {
    fn from(err: crate::resource::LookupError) -> Self {
        use crate::resource::LookupError;

        match err {
            LookupError::UnknownResource(_) | LookupError::VerbNotDeclared { .. } => {
                ApiError::NotFound
            }
            LookupError::MissingSchema(name) => {
                // Keep serving other resources; the operator sees this in the logs
                tracing::error!("Resource '{}' is declared without a schema", name);
                ApiError::NotFound
            }
        }
    }
}

impl From<crate::auth::AuthError> for ApiError {
    fn from(err: crate::auth::AuthError) -> Self {
        tracing::warn!("Authentication rejected: {}", err);
        ApiError::Unauthorized
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        self.to_envelope().into_response()
    }
}
