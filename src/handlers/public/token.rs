use axum::extract::{Query, State};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::app::AppState;
use crate::auth::Claims;
use crate::error::ApiError;
use crate::middleware::Envelope;

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub role: Option<String>,
    pub id: Option<String>,
}

/// GET /get-token - mint a development token for `?role=&id=`
///
/// Only served when token display is switched on; otherwise the route is
/// indistinguishable from an unknown path.
pub async fn get_token(
    State(state): State<AppState>,
    query: Option<Query<TokenQuery>>,
) -> Result<Envelope, ApiError> {
    if !state.show_token {
        return Err(ApiError::NotFound);
    }

    let query = query.map(|Query(q)| q).unwrap_or_default();
    let now = Utc::now();
    let exp = expiry(now, state.token_expiry_hours).ok_or_else(|| {
        error!("Token expiry of {} hours is out of range", state.token_expiry_hours);
        ApiError::InternalServerError
    })?;
    let claims = Claims {
        iat: Some(now.timestamp()),
        exp: Some(exp),
        ..Claims::new(query.role, query.id)
    };

    let token = state.auth.verifier.issue(&claims).await.map_err(|e| {
        error!("Failed to sign development token: {}", e);
        ApiError::InternalServerError
    })?;

    info!("Issued development token for role '{}'", claims.role());
    Ok(Envelope::ok(json!({ "token": token })))
}

/// `now + hours` as a unix timestamp, or `None` when it does not fit
fn expiry(now: DateTime<Utc>, hours: u64) -> Option<i64> {
    let ttl = i64::try_from(hours).ok().and_then(Duration::try_hours)?;
    now.checked_add_signed(ttl).map(|at| at.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_hours_from_now() {
        let now = Utc::now();
        assert_eq!(expiry(now, 24), Some(now.timestamp() + 24 * 3600));
        assert_eq!(expiry(now, 0), Some(now.timestamp()));
    }

    #[test]
    fn oversized_expiry_is_refused() {
        let now = Utc::now();
        assert_eq!(expiry(now, u64::MAX), None);
        assert_eq!(expiry(now, i64::MAX as u64), None);
        assert_eq!(expiry(now, 1 << 40), None);
    }
}
