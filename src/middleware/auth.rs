use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::{roles, AuthError, Claims, TokenVerifier};
use crate::config::AppConfig;
use crate::error::ApiError;

/// Header carrying the fingerprint of the key a token was signed against
pub const FINGERPRINT_HEADER: &str = "x-key-fingerprint";

/// Authenticated caller context extracted from the bearer token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub role: String,
    pub subject: Option<String>,
}

impl AuthUser {
    /// Caller on a public path, or any caller while authentication is disabled
    pub fn anonymous() -> Self {
        Self {
            role: roles::ANONYMOUS_ROLE.to_string(),
            subject: None,
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            role: claims.role().to_string(),
            subject: claims.subject().map(str::to_string),
        }
    }
}

/// Authentication settings handed to the middleware at construction
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub verifier: Arc<TokenVerifier>,
    pub disabled: bool,
    pub base_path: String,
    /// Exact paths, or prefixes ending in `*`, relative to `base_path`
    pub public_paths: Vec<String>,
}

impl AuthConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            verifier: Arc::new(TokenVerifier::new(config.security.key_mode.clone())),
            disabled: config.security.disable_auth,
            base_path: config.server.base_path(),
            public_paths: config.security.public_paths.clone(),
        }
    }

    /// Whether `path` (absolute request path) skips credential verification
    pub fn is_public(&self, path: &str) -> bool {
        let Some(relative) = path.strip_prefix(self.base_path.as_str()) else {
            return false;
        };
        let relative = normalize(relative);

        self.public_paths.iter().any(|entry| match entry.strip_suffix('*') {
            Some(prefix) => relative.starts_with(prefix),
            None => relative == normalize(entry),
        })
    }
}

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// JWT authentication middleware that validates tokens and extracts the caller role
pub async fn jwt_auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if auth.disabled || auth.is_public(request.uri().path()) {
        debug!("No credential required for {}", request.uri().path());
        request.extensions_mut().insert(AuthUser::anonymous());
        return Ok(next.run(request).await);
    }

    let headers = request.headers();
    let token = extract_jwt_from_headers(headers)?;
    let fingerprint = headers
        .get(FINGERPRINT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let claims = auth.verifier.verify(&token, fingerprint.as_deref()).await?;
    let user = AuthUser::from(claims);
    debug!("Authenticated caller with role '{}'", user.role);

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, AuthError> {
    let auth_str = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(AuthError::MalformedHeader),
    }
}
