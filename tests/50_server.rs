mod common;

use anyhow::Result;
use common::TestServer;
use reqwest::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn test_index_reports_name_and_version() -> Result<()> {
    let server = TestServer::start().await?;
    let token = server.token("viewer").await;

    let (status, body) = server.send(Method::GET, "", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "ok");
    assert_eq!(body["data"]["name"], "kratos-api");
    assert!(body["data"]["version"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_maintenance_mode_answers_503() -> Result<()> {
    let server = TestServer::start_with(|config| config.server.maintenance = true).await?;
    let token = server.token("admin").await;

    let (status, body) = server.send(Method::GET, "/widgets", Some(&token), None).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"status": 503, "message": "service unavailable"}));
    assert_eq!(server.adapter_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_unknown_paths_answer_with_the_envelope() -> Result<()> {
    let server = TestServer::start().await?;
    let token = server.token("admin").await;

    let (status, body) = server.send(Method::GET, "/widgets/a/b", Some(&token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "resource not found");

    let (status, _) = server.send(Method::GET, "/custom/anything", Some(&token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = server
        .client()
        .get(format!("{}/elsewhere", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_api_version_sets_the_base_path() -> Result<()> {
    let server = TestServer::start_with(|config| config.server.api_version = 2).await?;
    assert!(server.api_url.ends_with("/api/v2"));

    let (status, _) = server.send(Method::GET, "/get-token?role=admin", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[test]
fn test_sample_registry_loads() -> Result<()> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/resources.yaml");
    let registry = kratos_api::resource::ResourceRegistry::from_file(path)?;
    assert!(registry.get("users").is_some());
    assert!(registry.get("posts").is_some());
    Ok(())
}

#[tokio::test]
async fn test_responses_carry_security_headers() -> Result<()> {
    let server = TestServer::start().await?;

    let response = server.client().get(format!("{}/widgets", server.api_url)).send().await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
    assert_eq!(headers["referrer-policy"], "no-referrer");
    assert_eq!(headers["strict-transport-security"], "max-age=15552000; includeSubDomains");
    Ok(())
}
