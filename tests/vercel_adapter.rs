use serde_json::json;
use shipwright::platform::{
    AdapterError, DeploymentConfig, DeploymentLookup, PlatformAdapter, PlatformOptions,
    ProviderState, SubmitRequest, VercelAdapter,
};
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> VercelAdapter {
    VercelAdapter::new(&server.uri(), "vercel-token", Duration::from_secs(5)).unwrap()
}

fn request(config: DeploymentConfig) -> SubmitRequest {
    SubmitRequest {
        job_id: Uuid::new_v4(),
        repo_url: "https://github.com/acme/site".to_string(),
        repo_path: None,
        config,
    }
}

#[tokio::test]
async fn test_submit_creates_missing_project() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v9/projects/site"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "not_found", "message": "Project not found" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v10/projects"))
        .and(header("authorization", "Bearer vercel-token"))
        .and(body_partial_json(json!({
            "name": "site",
            "gitRepository": { "type": "github", "repo": "acme/site" },
            "environmentVariables": [{ "key": "API_URL", "value": "https://api.acme.dev" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "prj_1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v13/deployments"))
        .and(body_partial_json(json!({
            "project": "prj_1",
            "target": "production",
            "gitSource": { "org": "acme", "repo": "site", "ref": "release" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "dpl_1",
            "url": "site-abc.vercel.app",
            "readyState": "QUEUED"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = DeploymentConfig {
        branch: Some("release".to_string()),
        ..DeploymentConfig::default()
    };
    config
        .env_vars
        .insert("API_URL".to_string(), "https://api.acme.dev".to_string());

    let submission = adapter(&server).submit(&request(config)).await.unwrap();

    assert_eq!(submission.deployment_id, "dpl_1");
    assert_eq!(submission.url.as_deref(), Some("https://site-abc.vercel.app"));
    assert_eq!(submission.state, ProviderState::Queued);
}

#[tokio::test]
async fn test_team_scope_follows_the_deployment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v9/projects/storefront"))
        .and(query_param("teamId", "team_42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "prj_9" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v13/deployments"))
        .and(query_param("teamId", "team_42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "dpl_9",
            "readyState": "BUILDING"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v13/deployments/dpl_9"))
        .and(query_param("teamId", "team_42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "dpl_9",
            "url": "storefront.vercel.app",
            "readyState": "READY"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let config = DeploymentConfig {
        project_name: Some("storefront".to_string()),
        options: Some(PlatformOptions::Vercel {
            team_id: Some("team_42".to_string()),
        }),
        ..DeploymentConfig::default()
    };
    let submission = adapter.submit(&request(config)).await.unwrap();
    assert_eq!(submission.state, ProviderState::Building);
    assert_eq!(adapter.scoped_deployments(), 1);

    let report = adapter.query_status("dpl_9").await.unwrap();
    assert_eq!(report.state, ProviderState::Ready);
    assert_eq!(report.url.as_deref(), Some("https://storefront.vercel.app"));
    assert_eq!(adapter.scoped_deployments(), 0);
}

#[tokio::test]
async fn test_status_error_carries_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v13/deployments/dpl_2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "dpl_2",
            "readyState": "ERROR",
            "errorMessage": "Command \"npm run build\" exited with 1"
        })))
        .mount(&server)
        .await;

    let report = adapter(&server).query_status("dpl_2").await.unwrap();
    assert_eq!(report.state, ProviderState::Error);
    assert!(report.message.unwrap().contains("npm run build"));
}

#[tokio::test]
async fn test_http_failures_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v13/deployments/busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v13/deployments/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v13/deployments/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "forbidden", "message": "Not authorized" }
        })))
        .mount(&server)
        .await;

    let adapter = adapter(&server);

    let err = adapter.query_status("busy").await.unwrap_err();
    assert!(matches!(err, AdapterError::Unavailable { status: 503, .. }));
    assert!(err.is_transient());

    let err = adapter.query_status("limited").await.unwrap_err();
    assert!(matches!(
        err,
        AdapterError::RateLimited {
            retry_after: Some(d)
        } if d == Duration::from_secs(7)
    ));

    let err = adapter.query_status("forbidden").await.unwrap_err();
    assert!(matches!(err, AdapterError::Auth(ref message) if message == "Not authorized"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_cancel_uses_patch() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v12/deployments/dpl_3/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "dpl_3",
            "readyState": "CANCELED"
        })))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server).cancel("dpl_3").await.unwrap();
}

#[tokio::test]
async fn test_lookup_by_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v13/deployments/site-abc.vercel.app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "dpl_4",
            "url": "site-abc.vercel.app",
            "readyState": "READY"
        })))
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let report = adapter
        .lookup_by_url("https://site-abc.vercel.app/")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.deployment_id, "dpl_4");

    let missing = adapter
        .lookup_by_url("https://gone.vercel.app")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_non_github_repository_is_rejected() {
    let server = MockServer::start().await;
    let mut request = request(DeploymentConfig::default());
    request.repo_url = "https://gitlab.com/acme/site".to_string();

    let err = adapter(&server).submit(&request).await.unwrap_err();
    assert!(matches!(err, AdapterError::Validation(_)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
