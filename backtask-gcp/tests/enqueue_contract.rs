//! Enqueue Contract Tests
//!
//! These tests drive `Enqueuer` against mocked Cloud Functions and Cloud
//! Tasks APIs and verify:
//! - The function URL is looked up for the configured project/region/name
//! - The created task targets exactly the resolved URL
//! - Method, headers, body and OIDC account match what the handler expects
//! - Every call creates a new task
//! - Credential failures stop before any task is created

use async_trait::async_trait;
use backtask_gcp::{
    CloudTasksQueue, Enqueuer, Error, FunctionsClient, GcpConfig, Result, TokenSource,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const FUNCTION_PATH: &str = "/v2beta/projects/proj-1/locations/us-central1/functions/processtask";
const TASKS_PATH: &str = "/v2/projects/proj-1/locations/us-central1/queues/processtask/tasks";
const SERVICE_ACCOUNT: &str = "backup@proj-1.iam.gserviceaccount.com";

struct StaticToken;

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self, _scope: &str) -> Result<String> {
        Ok("test-token".to_string())
    }

    fn project_id(&self) -> Option<&str> {
        Some("proj-1")
    }
}

struct FailingToken;

#[async_trait]
impl TokenSource for FailingToken {
    async fn access_token(&self, _scope: &str) -> Result<String> {
        Err(Error::Auth("no credentials".to_string()))
    }
}

fn enqueuer(server: &MockServer, auth: Arc<dyn TokenSource>) -> Enqueuer {
    let config = GcpConfig::new("proj-1", SERVICE_ACCOUNT);
    let functions = FunctionsClient::with_endpoint(auth.clone(), server.uri()).unwrap();
    let queue = CloudTasksQueue::with_endpoint(
        config.project_id.clone(),
        config.location.clone(),
        config.queue_name.clone(),
        auth,
        server.uri(),
    )
    .unwrap();
    Enqueuer::from_parts(config, functions, queue).unwrap()
}

async fn mount_function(server: &MockServer, uri: &str) {
    Mock::given(method("GET"))
        .and(path(FUNCTION_PATH))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/proj-1/locations/us-central1/functions/processtask",
            "serviceConfig": {"uri": uri},
        })))
        .mount(server)
        .await;
}

async fn mount_create_task(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(TASKS_PATH))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/proj-1/locations/us-central1/queues/processtask/tasks/42",
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn created_tasks(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == TASKS_PATH)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

mod task_contract {
    use super::*;

    #[tokio::test]
    async fn task_targets_resolved_function_url() {
        let server = MockServer::start().await;
        mount_function(&server, "https://example.com/fn").await;
        mount_create_task(&server, 1).await;

        let name = enqueuer(&server, Arc::new(StaticToken)).enqueue().await.unwrap();
        assert_eq!(name, "projects/proj-1/locations/us-central1/queues/processtask/tasks/42");

        let tasks = created_tasks(&server).await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["task"]["httpRequest"]["url"], "https://example.com/fn");
    }

    #[tokio::test]
    async fn task_has_fixed_method_headers_and_oidc_account() {
        let server = MockServer::start().await;
        mount_function(&server, "https://example.com/fn").await;
        mount_create_task(&server, 1).await;

        enqueuer(&server, Arc::new(StaticToken)).enqueue().await.unwrap();

        let tasks = created_tasks(&server).await;
        let http = &tasks[0]["task"]["httpRequest"];
        assert_eq!(http["httpMethod"], "POST");
        assert_eq!(http["headers"], json!({"Content-type": "application/json"}));
        assert_eq!(http["oidcToken"], json!({"serviceAccountEmail": SERVICE_ACCOUNT}));
    }

    #[tokio::test]
    async fn task_body_is_base64_of_test_data() {
        let server = MockServer::start().await;
        mount_function(&server, "https://example.com/fn").await;
        mount_create_task(&server, 1).await;

        enqueuer(&server, Arc::new(StaticToken)).enqueue().await.unwrap();

        let tasks = created_tasks(&server).await;
        let encoded = tasks[0]["task"]["httpRequest"]["body"].as_str().unwrap();
        let body: Value = serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(body, json!({"data": "test_data"}));
    }
}

mod enqueue_behavior {
    use super::*;

    #[tokio::test]
    async fn repeated_calls_create_duplicate_tasks() {
        let server = MockServer::start().await;
        mount_function(&server, "https://example.com/fn").await;
        mount_create_task(&server, 2).await;

        let enqueuer = enqueuer(&server, Arc::new(StaticToken));
        enqueuer.enqueue().await.unwrap();
        enqueuer.enqueue().await.unwrap();

        let tasks = created_tasks(&server).await;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0], tasks[1]);
    }

    #[tokio::test]
    async fn url_is_resolved_on_every_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(FUNCTION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "serviceConfig": {"uri": "https://example.com/fn"},
            })))
            .expect(2)
            .mount(&server)
            .await;
        mount_create_task(&server, 2).await;

        let enqueuer = enqueuer(&server, Arc::new(StaticToken));
        enqueuer.enqueue().await.unwrap();
        enqueuer.enqueue().await.unwrap();
    }

    #[tokio::test]
    async fn credential_failure_creates_no_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_create_task(&server, 0).await;

        let err = enqueuer(&server, Arc::new(FailingToken))
            .enqueue()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn missing_function_uri_creates_no_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(FUNCTION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "fn"})))
            .mount(&server)
            .await;
        mount_create_task(&server, 0).await;

        let err = enqueuer(&server, Arc::new(StaticToken))
            .enqueue()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(_)));
    }

    #[tokio::test]
    async fn queue_not_found_is_surfaced() {
        let server = MockServer::start().await;
        mount_function(&server, "https://example.com/fn").await;
        Mock::given(method("POST"))
            .and(path(TASKS_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "Queue does not exist.", "status": "NOT_FOUND"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = enqueuer(&server, Arc::new(StaticToken))
            .enqueue()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(msg) if msg.contains("Queue does not exist")));
    }
}
