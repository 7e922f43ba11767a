//! Cloud Functions control-plane lookups

use crate::auth::TokenSource;
use crate::metrics::ENQUEUE_DURATION;
use crate::{Error, Result, CLOUD_PLATFORM_SCOPE};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Production Cloud Functions API endpoint
pub const DEFAULT_FUNCTIONS_ENDPOINT: &str = "https://cloudfunctions.googleapis.com";

/// Client for the Cloud Functions v2beta API
#[derive(Clone)]
pub struct FunctionsClient {
    endpoint: String,
    auth: Arc<dyn TokenSource>,
    http_client: reqwest::Client,
}

impl FunctionsClient {
    /// Create a client against the production endpoint
    pub fn new(auth: Arc<dyn TokenSource>) -> Result<Self> {
        Self::with_endpoint(auth, DEFAULT_FUNCTIONS_ENDPOINT)
    }

    /// Create a client against a custom endpoint (emulators, tests)
    pub fn with_endpoint(auth: Arc<dyn TokenSource>, endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth,
            http_client: crate::http_client(Duration::from_secs(30))?,
        })
    }

    /// Resource URL of a function
    pub fn function_resource_url(&self, project_id: &str, location: &str, name: &str) -> String {
        format!(
            "{}/v2beta/projects/{}/locations/{}/functions/{}",
            self.endpoint, project_id, location, name
        )
    }

    /// Look up the invocation URI of a deployed function
    ///
    /// Returns the `serviceConfig.uri` field of the function resource. The
    /// result is not cached; every call queries the API.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No access token can be obtained
    /// - The request fails or the API answers with a non-success status
    /// - The response lacks `serviceConfig.uri`
    pub async fn function_url(&self, project_id: &str, location: &str, name: &str) -> Result<String> {
        let _timer = ENQUEUE_DURATION.with_label_values(&["resolve"]).start_timer();

        let access_token = self.auth.access_token(CLOUD_PLATFORM_SCOPE).await?;
        let url = self.function_resource_url(project_id, location, name);

        debug!(url = %url, "Fetching function metadata");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!(
                "Cloud Functions API returned {} for {}: {}",
                status, name, body
            )));
        }

        let function: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Api(format!("Failed to parse function metadata: {}", e)))?;

        let uri = function["serviceConfig"]["uri"]
            .as_str()
            .ok_or_else(|| {
                Error::Api(format!("Function {} has no serviceConfig.uri", name))
            })?
            .to_string();

        info!(function = %name, location = %location, uri = %uri, "Resolved function URL");
        Ok(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticToken;

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn access_token(&self, _scope: &str) -> Result<String> {
            Ok("test-token".to_string())
        }
    }

    fn client(server: &MockServer) -> FunctionsClient {
        FunctionsClient::with_endpoint(Arc::new(StaticToken), server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_returns_service_config_uri() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2beta/projects/proj-1/locations/us-central1/functions/processtask"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/proj-1/locations/us-central1/functions/processtask",
                "serviceConfig": {"uri": "https://example.com/fn"},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = client(&server)
            .function_url("proj-1", "us-central1", "processtask")
            .await
            .unwrap();
        assert_eq!(uri, "https://example.com/fn");
    }

    #[tokio::test]
    async fn test_missing_uri_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"serviceConfig": {}})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .function_url("proj-1", "us-central1", "processtask")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(msg) if msg.contains("serviceConfig.uri")));
    }

    #[tokio::test]
    async fn test_not_found_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("function not found"))
            .mount(&server)
            .await;

        let err = client(&server)
            .function_url("proj-1", "us-central1", "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(msg) if msg.contains("404")));
    }

    #[test]
    fn test_resource_url_trims_trailing_slash() {
        let client =
            FunctionsClient::with_endpoint(Arc::new(StaticToken), "http://localhost:9000/").unwrap();
        assert_eq!(
            client.function_resource_url("p", "europe-west1", "f"),
            "http://localhost:9000/v2beta/projects/p/locations/europe-west1/functions/f"
        );
    }
}
