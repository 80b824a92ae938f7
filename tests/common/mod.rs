#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use kratos_api::app::{self, AppState};
use kratos_api::auth::{Claims, KeyMode, TokenVerifier};
use kratos_api::config::AppConfig;
use kratos_api::database::{Collection, DataAdapter, Document, MemoryAdapter, Outcome};
use kratos_api::resource::ResourceRegistry;

pub const SECRET: &str = "integration-test-secret";

pub const RESOURCES: &str = r#"
resources:
  - name: widgets
    schema:
      natural_key: sku
      fields:
        sku: { type: string, unique: true }
        name: { type: string }
        color: { type: string }
    validation:
      post:
        roles: [admin]
        rules:
          sku: { type: string, required: true }
          name: { type: string, required: true }
          color: { type: string, valid: [red, green, blue] }
      get:
        roles: [admin, viewer]
        singleRoles: [admin, viewer]
        rules:
          color: { type: string }
      patch:
        singleRoles: [admin]
        rules:
          name: { type: string }
          color: { type: string, valid: [red, green, blue] }
      delete:
        singleRoles: [admin]
  - name: notes
    schema:
      fields:
        text: { type: string }
    validation:
      post:
        roles: [public]
        rules:
          text: { type: string }
      get: {}
"#;

/// Memory adapter that counts how often the pipeline reached the store
pub struct CountingAdapter {
    inner: MemoryAdapter,
    calls: Arc<AtomicUsize>,
}

impl CountingAdapter {
    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataAdapter for CountingAdapter {
    fn is_valid_id(&self, id: &str) -> bool {
        self.inner.is_valid_id(id)
    }

    async fn find_one(&self, collection: Collection<'_>, id: Option<&str>, filter: Document) -> Outcome {
        self.hit();
        self.inner.find_one(collection, id, filter).await
    }

    async fn find_many(&self, collection: Collection<'_>, filter: Document) -> Outcome {
        self.hit();
        self.inner.find_many(collection, filter).await
    }

    async fn count(&self, collection: Collection<'_>, filter: Document) -> Outcome {
        self.hit();
        self.inner.count(collection, filter).await
    }

    async fn create(&self, collection: Collection<'_>, data: Document) -> Outcome {
        self.hit();
        self.inner.create(collection, data).await
    }

    async fn update(&self, collection: Collection<'_>, id: &str, data: Document) -> Outcome {
        self.hit();
        self.inner.update(collection, id, data).await
    }

    async fn delete(&self, collection: Collection<'_>, id: &str) -> Outcome {
        self.hit();
        self.inner.delete(collection, id).await
    }
}

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub api_url: String,
    adapter_calls: Arc<AtomicUsize>,
    verifier: TokenVerifier,
    client: reqwest::Client,
}

impl TestServer {
    /// Default server: HS256 auth, token endpoint on, fresh in-memory store
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;

        let mut config = AppConfig::from_env();
        config.server.port = port;
        config.server.api_version = 1;
        config.server.maintenance = false;
        config.api.enable_request_logging = false;
        config.security.disable_auth = false;
        config.security.show_token = true;
        config.security.public_paths = vec!["/get-token".to_string()];
        config.security.key_mode = KeyMode::Symmetric { secret: SECRET.to_string() };
        configure(&mut config);

        let registry = ResourceRegistry::from_yaml_str(RESOURCES)?;
        let adapter_calls = Arc::new(AtomicUsize::new(0));
        let adapter = Arc::new(CountingAdapter {
            inner: MemoryAdapter::new(),
            calls: adapter_calls.clone(),
        });

        let verifier = TokenVerifier::new(config.security.key_mode.clone());
        let state = AppState::new(&config, registry, adapter);
        let app = app::build(state, &config);

        // Bound before spawning, so requests queue until the server runs
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test server")?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let base_url = format!("http://127.0.0.1:{}", port);
        Ok(Self {
            port,
            api_url: format!("{}{}", base_url, config.server.base_path()),
            base_url,
            adapter_calls,
            verifier,
            client: reqwest::Client::new(),
        })
    }

    pub fn adapter_calls(&self) -> usize {
        self.adapter_calls.load(Ordering::SeqCst)
    }

    /// Token signed with the server's key for `role`
    pub async fn token(&self, role: &str) -> String {
        self.verifier
            .issue(&Claims::new(Some(role.to_string()), None))
            .await
            .expect("failed to sign test token")
    }

    /// Send a request to `{api_url}{path}` and decode the envelope
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut request = self.client.request(method, format!("{}{}", self.api_url, path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.context("request failed")?;
        let status = response.status();
        let envelope = response.json::<Value>().await.context("response was not JSON")?;
        Ok((status, envelope))
    }

    pub async fn send_raw(&self, request: reqwest::RequestBuilder) -> Result<(StatusCode, Value)> {
        let response = request.send().await.context("request failed")?;
        let status = response.status();
        Ok((status, response.json::<Value>().await?))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}
