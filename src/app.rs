// app.rs - Router assembly
//
// Layer order, outermost first: trace, CORS, security headers, maintenance
// gate, body limit, authentication. Every response, including fallbacks, uses the envelope.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{any, get},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::{AppConfig, SecurityConfig};
use crate::database::DataAdapter;
use crate::handlers::{protected::resource, public};
use crate::middleware::{jwt_auth_middleware, maintenance_middleware, with_security_headers, AuthConfig};
use crate::resource::ResourceRegistry;

/// Shared, read-only state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ResourceRegistry>,
    pub adapter: Arc<dyn DataAdapter>,
    pub auth: AuthConfig,
    pub show_token: bool,
    pub token_expiry_hours: u64,
}

impl AppState {
    pub fn new(config: &AppConfig, registry: ResourceRegistry, adapter: Arc<dyn DataAdapter>) -> Self {
        Self {
            registry: Arc::new(registry),
            adapter,
            auth: AuthConfig::from_app_config(config),
            show_token: config.security.show_token,
            token_expiry_hours: config.security.jwt_expiry_hours,
        }
    }
}

/// The full application without any custom routes
pub fn build(state: AppState, config: &AppConfig) -> Router {
    build_with_custom(state, config, None)
}

/// The full application, with `custom` mounted under `{base}/custom`
pub fn build_with_custom(state: AppState, config: &AppConfig, custom: Option<Router>) -> Router {
    let base = state.auth.base_path.clone();
    let auth = state.auth.clone();

    for definition in state.registry.iter() {
        info!("Serving resource '{}' at {}/{}", definition.name, base, definition.name);
    }

    let router = Router::new()
        .route(&base, get(public::index))
        .route(&format!("{base}/"), get(public::index))
        .route(&format!("{base}/get-token"), get(public::get_token))
        .route(
            &format!("{base}/:resource"),
            get(resource::list)
                .post(resource::create)
                .fallback(public::not_found),
        )
        .route(
            &format!("{base}/:resource/count"),
            get(resource::count).fallback(public::not_found),
        )
        .route(
            &format!("{base}/:resource/:id"),
            get(resource::read)
                .patch(resource::update)
                .delete(resource::delete)
                .fallback(public::not_found),
        )
        .with_state(state);

    let custom_path = format!("{base}/custom");
    let router = match custom {
        Some(custom) => router.nest(&custom_path, custom),
        None => router
            .route(&custom_path, any(public::not_found))
            .route(&format!("{custom_path}/*rest"), any(public::not_found)),
    };

    let mut app = router
        .fallback(public::not_found)
        .layer(middleware::from_fn_with_state(auth, jwt_auth_middleware))
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes));

    if config.server.maintenance {
        warn!("Maintenance mode is on; every request is refused with 503");
        app = app.layer(middleware::from_fn(maintenance_middleware));
    }

    let mut app = with_security_headers(app);

    if config.security.enable_cors {
        app = app.layer(cors_layer(&config.security));
    }

    if config.api.enable_request_logging {
        app = app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
    }

    app
}

/// Configured origins, or permissive when none are listed
fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if security.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Claims, KeyMode};
    use crate::database::MemoryAdapter;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const RESOURCES: &str = r#"
resources:
  - name: widgets
    schema:
      fields:
        name: { type: string, unique: true }
    validation:
      post:
        roles: [admin]
        rules:
          name: { type: string, required: true }
      get:
        singleRoles: [admin, viewer]
"#;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::from_env();
        config.server.api_version = 1;
        config.server.maintenance = false;
        config.security.disable_auth = false;
        config.security.show_token = true;
        config.security.public_paths = vec!["/get-token".to_string()];
        config.security.key_mode = KeyMode::Symmetric { secret: "app-test".into() };
        config
    }

    fn test_app(config: &AppConfig) -> Router {
        let registry = ResourceRegistry::from_yaml_str(RESOURCES).unwrap();
        let state = AppState::new(config, registry, Arc::new(MemoryAdapter::new()));
        build(state, config)
    }

    async fn token(config: &AppConfig, role: &str) -> String {
        AuthConfig::from_app_config(config)
            .verifier
            .issue(&Claims::new(Some(role.to_string()), None))
            .await
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn requests_without_a_token_are_unauthorized() {
        let config = test_config();
        let request = Request::get("/api/v1/widgets").body(Body::empty()).unwrap();
        let (status, body) = send(test_app(&config), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"status": 401, "message": "unauthorized"}));
    }

    #[tokio::test]
    async fn unmatched_paths_use_the_envelope() {
        let config = test_config();
        let bearer = format!("Bearer {}", token(&config, "admin").await);
        let request = Request::get("/api/v1/widgets/a/b/c")
            .header("authorization", bearer)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(test_app(&config), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "resource not found");
    }

    #[tokio::test]
    async fn undeclared_methods_are_not_found() {
        let config = test_config();
        let bearer = format!("Bearer {}", token(&config, "admin").await);
        let request = Request::put("/api/v1/widgets")
            .header("authorization", bearer)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(test_app(&config), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn maintenance_mode_refuses_everything() {
        let mut config = test_config();
        config.server.maintenance = true;
        let request = Request::get("/api/v1/get-token").body(Body::empty()).unwrap();
        let (status, body) = send(test_app(&config), request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["message"], "service unavailable");
    }

    #[tokio::test]
    async fn custom_slot_is_not_found_until_claimed() {
        let mut config = test_config();
        config.security.disable_auth = true;

        let request = Request::get("/api/v1/custom/report").body(Body::empty()).unwrap();
        let (status, _) = send(test_app(&config), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let registry = ResourceRegistry::from_yaml_str(RESOURCES).unwrap();
        let state = AppState::new(&config, registry, Arc::new(MemoryAdapter::new()));
        let custom = Router::new().route(
            "/report",
            get(|| async { crate::middleware::Envelope::ok(json!({"rows": 3})) }),
        );
        let app = build_with_custom(state, &config, Some(custom));

        let request = Request::get("/api/v1/custom/report").body(Body::empty()).unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["rows"], 3);
    }

    #[tokio::test]
    async fn security_headers_cover_refusals_and_fallbacks() {
        let mut config = test_config();
        let requests = [
            Request::get("/api/v1/widgets").body(Body::empty()).unwrap(),
            Request::get("/elsewhere").body(Body::empty()).unwrap(),
        ];
        for request in requests {
            let response = test_app(&config).oneshot(request).await.unwrap();
            for (name, value) in crate::middleware::SECURITY_HEADERS {
                assert_eq!(response.headers()[name], value, "{name}");
            }
        }

        config.server.maintenance = true;
        let request = Request::get("/api/v1").body(Body::empty()).unwrap();
        let response = test_app(&config).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
    }

    #[tokio::test]
    async fn index_reports_name_and_version() {
        let config = test_config();
        let bearer = format!("Bearer {}", token(&config, "viewer").await);
        let request = Request::get("/api/v1")
            .header("authorization", bearer)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(test_app(&config), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], env!("CARGO_PKG_NAME"));
    }
}
