use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::database::Outcome;
use crate::error::ApiError;

/// The JSON body every endpoint answers with: `{status, message, data?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// 200 with a payload. Scalars are dropped so `data` is only ever an object or array.
    pub fn ok(data: Value) -> Self {
        let data = match data {
            Value::Object(_) | Value::Array(_) => Some(data),
            _ => None,
        };
        Self {
            status: StatusCode::OK.as_u16(),
            message: "ok".to_string(),
            data,
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            data: None,
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Map a data-store outcome onto the response envelope
pub fn render(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Found(record) => Envelope::ok(record).into_response(),
        Outcome::FoundMany(records) => Envelope::ok(Value::Array(records)).into_response(),
        Outcome::Count(count) => Envelope::ok(json!({ "count": count })).into_response(),
        Outcome::NotFound => ApiError::NotFound.into_response(),
        Outcome::Duplicate(field) => ApiError::Duplicate(field).into_response(),
        Outcome::StoreError => ApiError::InternalServerError.into_response(),
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        render(self)
    }
}
