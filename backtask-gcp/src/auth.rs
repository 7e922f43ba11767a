//! GCP Application Default Credentials
//!
//! Credentials are looked up in the same order Google's client libraries use:
//! - **`GOOGLE_APPLICATION_CREDENTIALS`**: path to a credentials JSON file
//! - **gcloud well-known file**: written by `gcloud auth application-default login`
//! - **Metadata server**: Cloud Functions / Cloud Run / GCE workload identity
//!
//! Credential files may hold a `service_account` key (JWT assertion grant)
//! or an `authorized_user` refresh token.

use crate::metrics::TOKEN_ACQUISITION_DURATION;
use crate::{Error, Result};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default OAuth2 token endpoint
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// GCE metadata server host, overridable with `GCE_METADATA_HOST`
const METADATA_SERVER_HOST: &str = "metadata.google.internal";

/// Header required for metadata server requests
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR_VALUE: &str = "Google";

/// File name gcloud writes application default credentials to
const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

/// Seconds shaved off a token's lifetime before it is considered expired
const EXPIRY_MARGIN_SECS: u64 = 300;

/// Source of OAuth2 access tokens for calling Google APIs
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a bearer token valid for `scope`.
    async fn access_token(&self, scope: &str) -> Result<String>;

    /// Project the credentials belong to, when known.
    fn project_id(&self) -> Option<&str> {
        None
    }
}

/// Service account key file
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    #[serde(default)]
    project_id: Option<String>,
    private_key_id: String,
    private_key: String,
    client_email: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// User credentials written by `gcloud auth application-default login`
#[derive(Debug, Clone, Deserialize)]
struct AuthorizedUserCredentials {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default)]
    quota_project_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Credentials file contents, keyed on its `type` field
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount(ServiceAccountCredentials),
    AuthorizedUser(AuthorizedUserCredentials),
}

/// JWT claims for OAuth2 service account assertion
#[derive(Debug, Serialize)]
struct OAuth2Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: u64,
    iat: u64,
}

/// Response from OAuth2 token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    token_type: Option<String>,
}

/// OAuth2 access token with expiration
#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: Instant,
}

impl AccessToken {
    fn from_response(response: TokenResponse) -> Self {
        let expires_in = response.expires_in.saturating_sub(EXPIRY_MARGIN_SECS);
        Self {
            token: response.access_token,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Authentication mode
#[derive(Debug, Clone)]
enum AuthMode {
    ServiceAccount(ServiceAccountCredentials),
    AuthorizedUser(AuthorizedUserCredentials),
    MetadataServer { base_url: String },
}

/// Application Default Credentials for calling GCP APIs
///
/// Access tokens are cached per scope and reused until shortly before they
/// expire, so a long-lived process fetches a new token roughly once an hour.
pub struct GcpAuth {
    auth_mode: AuthMode,
    project_id: Option<String>,
    http_client: reqwest::Client,
    access_token_cache: Arc<RwLock<HashMap<String, AccessToken>>>,
}

impl GcpAuth {
    /// Create auth from the contents of a credentials JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed or names an unsupported
    /// credential type.
    pub fn from_credentials_json(credentials_json: &str) -> Result<Self> {
        let credentials: CredentialsFile = serde_json::from_str(credentials_json)
            .map_err(|e| Error::Auth(format!("Failed to parse credentials JSON: {}", e)))?;

        let (auth_mode, project_id) = match credentials {
            CredentialsFile::ServiceAccount(creds) => {
                let project_id = creds.project_id.clone();
                (AuthMode::ServiceAccount(creds), project_id)
            }
            CredentialsFile::AuthorizedUser(creds) => {
                let project_id = creds.quota_project_id.clone();
                (AuthMode::AuthorizedUser(creds), project_id)
            }
        };

        Ok(Self {
            auth_mode,
            project_id,
            http_client: crate::http_client(Duration::from_secs(30))?,
            access_token_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Create auth from a credentials file on disk
    pub fn from_credentials_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Auth(format!(
                "Failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_credentials_json(&json)
    }

    /// Create auth using the GCE metadata server
    ///
    /// The host defaults to `metadata.google.internal` and honors
    /// `GCE_METADATA_HOST`.
    pub async fn from_metadata_server() -> Result<Self> {
        Self::from_metadata_server_at(&metadata_base_url()).await
    }

    /// Create auth using a metadata server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata server is unreachable or does not
    /// report a project ID.
    pub async fn from_metadata_server_at(base_url: &str) -> Result<Self> {
        // Short timeout: off GCP the lookup should fail fast
        let http_client = crate::http_client(Duration::from_secs(5))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let url = format!("{}/computeMetadata/v1/project/project-id", base_url);
        let response = http_client
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await
            .map_err(|e| {
                Error::Auth(format!(
                    "Failed to connect to metadata server (not running on GCP?): {}",
                    e
                ))
            })?;

        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "Metadata server returned status {}",
                response.status()
            )));
        }

        let project_id = response.text().await.map_err(|e| {
            Error::Auth(format!("Failed to read project ID from metadata: {}", e))
        })?;

        info!(project_id = %project_id, "Initialized GCP auth via metadata server");

        Ok(Self {
            auth_mode: AuthMode::MetadataServer { base_url },
            project_id: Some(project_id.trim().to_string()),
            http_client,
            access_token_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Resolve Application Default Credentials
    ///
    /// Tries the following in order:
    /// 1. The file named by `GOOGLE_APPLICATION_CREDENTIALS`
    /// 2. The gcloud well-known credentials file
    /// 3. The GCE metadata server
    ///
    /// `GOOGLE_CLOUD_PROJECT` (or `GCLOUD_PROJECT`) overrides the project ID
    /// carried by the credentials.
    pub async fn application_default() -> Result<Self> {
        let mut auth = Self::from_sources(&CredentialSources::from_env()).await?;

        if let Some(project_id) = project_from_env() {
            debug!(project_id = %project_id, "Project ID taken from environment");
            auth.project_id = Some(project_id);
        }

        Ok(auth)
    }

    /// Resolve credentials from explicit sources, in lookup order
    ///
    /// # Errors
    ///
    /// A configured `credentials_file` that cannot be loaded is fatal; the
    /// remaining sources are not tried. Otherwise an error is returned when
    /// no source yields credentials.
    pub async fn from_sources(sources: &CredentialSources) -> Result<Self> {
        if let Some(path) = &sources.credentials_file {
            debug!(path = %path.display(), "Attempting GCP auth via GOOGLE_APPLICATION_CREDENTIALS");
            let auth = Self::from_credentials_file(path)?;
            info!(path = %path.display(), "Using credentials from GOOGLE_APPLICATION_CREDENTIALS");
            return Ok(auth);
        }

        if let Some(path) = sources.well_known_file.as_deref().filter(|p| p.is_file()) {
            debug!(path = %path.display(), "Attempting GCP auth via gcloud credentials");
            match Self::from_credentials_file(path) {
                Ok(auth) => {
                    info!(path = %path.display(), "Using gcloud application default credentials");
                    return Ok(auth);
                }
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Failed to load gcloud credentials");
                }
            }
        }

        debug!("Attempting GCP auth via metadata server");
        match Self::from_metadata_server_at(&sources.metadata_base_url).await {
            Ok(auth) => Ok(auth),
            Err(e) => {
                debug!(error = %e, "Metadata server not available");
                Err(Error::Auth(
                    "Could not find default credentials. Set GOOGLE_APPLICATION_CREDENTIALS, \
                     run `gcloud auth application-default login`, or run on GCP."
                        .to_string(),
                ))
            }
        }
    }

    /// Get an OAuth2 access token for calling GCP APIs
    ///
    /// Uses the cached token if available and not expired.
    pub async fn get_access_token(&self, scope: &str) -> Result<String> {
        {
            let cache = self.access_token_cache.read().await;
            if let Some(token) = cache.get(scope) {
                if !token.is_expired() {
                    let _timer = TOKEN_ACQUISITION_DURATION
                        .with_label_values(&["true"])
                        .start_timer();
                    debug!("Using cached OAuth2 access token");
                    return Ok(token.token.clone());
                }
            }
        }

        let _timer = TOKEN_ACQUISITION_DURATION
            .with_label_values(&["false"])
            .start_timer();

        debug!(scope = %scope, "Fetching new OAuth2 access token");
        let token = match &self.auth_mode {
            AuthMode::ServiceAccount(creds) => self.fetch_access_token_via_jwt(creds, scope).await?,
            AuthMode::AuthorizedUser(creds) => self.fetch_access_token_via_refresh(creds).await?,
            AuthMode::MetadataServer { base_url } => {
                self.fetch_access_token_from_metadata(base_url).await?
            }
        };

        {
            let mut cache = self.access_token_cache.write().await;
            cache.insert(scope.to_string(), token.clone());
        }

        Ok(token.token)
    }

    /// Project the credentials belong to, when known
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Fetch access token from metadata server
    async fn fetch_access_token_from_metadata(&self, base_url: &str) -> Result<AccessToken> {
        // The metadata server ignores scopes and returns the account's grants
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            base_url
        );

        let response = self
            .http_client
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Failed to fetch access token from metadata: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "Metadata server returned status {} for access token",
                response.status()
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            Error::Auth(format!("Failed to parse token response from metadata: {}", e))
        })?;

        debug!(
            token_type = ?token_response.token_type,
            expires_in_seconds = token_response.expires_in,
            "OAuth2 access token acquired from metadata server"
        );

        Ok(AccessToken::from_response(token_response))
    }

    /// Exchange a refresh token for an access token
    async fn fetch_access_token_via_refresh(
        &self,
        creds: &AuthorizedUserCredentials,
    ) -> Result<AccessToken> {
        let token_uri = creds.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("refresh_token", creds.refresh_token.as_str()),
        ];

        let token_response = self.request_token(token_uri, &params).await?;
        debug!(
            expires_in_seconds = token_response.expires_in,
            "OAuth2 access token acquired via refresh token"
        );
        Ok(AccessToken::from_response(token_response))
    }

    /// Fetch a new OAuth2 access token via JWT assertion
    async fn fetch_access_token_via_jwt(
        &self,
        creds: &ServiceAccountCredentials,
        scope: &str,
    ) -> Result<AccessToken> {
        let token_uri = creds.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = OAuth2Claims {
            iss: creds.client_email.clone(),
            scope: scope.to_string(),
            aud: token_uri.to_string(),
            iat: now,
            exp: now + 3600,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(creds.private_key_id.clone());

        let encoding_key = EncodingKey::from_rsa_pem(creds.private_key.as_bytes())
            .map_err(|e| Error::Auth(format!("Failed to parse private key: {}", e)))?;

        let assertion = encode(&header, &claims, &encoding_key)
            .map_err(|e| Error::Auth(format!("Failed to encode JWT assertion: {}", e)))?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        let token_response = self.request_token(token_uri, &params).await?;
        debug!(
            service_account = %creds.client_email,
            expires_in_seconds = token_response.expires_in,
            "OAuth2 access token acquired via JWT assertion"
        );
        Ok(AccessToken::from_response(token_response))
    }

    async fn request_token(&self, token_uri: &str, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Failed to request access token: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Failed to parse token response: {}", e)))
    }
}

#[async_trait]
impl TokenSource for GcpAuth {
    async fn access_token(&self, scope: &str) -> Result<String> {
        self.get_access_token(scope).await
    }

    fn project_id(&self) -> Option<&str> {
        GcpAuth::project_id(self)
    }
}

/// Places Application Default Credentials are looked up, in order
#[derive(Debug, Clone)]
pub struct CredentialSources {
    /// File named by `GOOGLE_APPLICATION_CREDENTIALS`
    pub credentials_file: Option<PathBuf>,
    /// gcloud well-known credentials file
    pub well_known_file: Option<PathBuf>,
    /// Metadata server base URL
    pub metadata_base_url: String,
}

impl CredentialSources {
    pub fn from_env() -> Self {
        Self {
            credentials_file: std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            well_known_file: well_known_credentials_path(
                std::env::var("CLOUDSDK_CONFIG").ok(),
                std::env::var("HOME").ok(),
                std::env::var("APPDATA").ok(),
            ),
            metadata_base_url: metadata_base_url(),
        }
    }
}

fn metadata_base_url() -> String {
    let host =
        std::env::var("GCE_METADATA_HOST").unwrap_or_else(|_| METADATA_SERVER_HOST.to_string());
    format!("http://{}", host)
}

fn project_from_env() -> Option<String> {
    ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

/// Location of the gcloud application default credentials file
///
/// `CLOUDSDK_CONFIG` wins, then `$HOME/.config/gcloud`, then
/// `%APPDATA%\gcloud` on Windows.
pub fn well_known_credentials_path(
    cloudsdk_config: Option<String>,
    home: Option<String>,
    appdata: Option<String>,
) -> Option<PathBuf> {
    if let Some(dir) = cloudsdk_config.filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join(WELL_KNOWN_FILE));
    }
    if cfg!(windows) {
        appdata
            .filter(|d| !d.is_empty())
            .map(|dir| PathBuf::from(dir).join("gcloud").join(WELL_KNOWN_FILE))
    } else {
        home.filter(|d| !d.is_empty()).map(|dir| {
            PathBuf::from(dir)
                .join(".config")
                .join("gcloud")
                .join(WELL_KNOWN_FILE)
        })
    }
}
