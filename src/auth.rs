//! OAuth 2.0 credentials for the Gmail API.
//!
//! The token file uses the same JSON layout as Google's `authorized_user`
//! credentials (`token`, `refresh_token`, `client_id`, `expiry`, ...), so a
//! `token.json` written by other Google client libraries is picked up as is.
//!
//! Resolution order mirrors the usual installed-app pattern:
//! 1. a stored token that has not expired is used directly;
//! 2. an expired token with a refresh token is refreshed;
//! 3. otherwise the browser consent flow runs against a loopback redirect.

use crate::config::PipelineConfig;
use crate::error::{AlertsError, Result};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use url::Url;

/// Google OAuth token endpoint
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google OAuth authorization endpoint
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Tokens expiring within this window are treated as expired
const EXPIRY_SKEW_SECS: i64 = 60;

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

/// Persisted user credentials (`token.json`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    /// Access token
    pub token: String,
    /// Refresh token, absent when the consent screen did not grant offline access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Access token expiry (UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Load a token file. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("Token file not found: {:?}", path);
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let token = serde_json::from_str(&content)?;
        Ok(Some(token))
    }

    /// Write the token file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)?;
        info!("Saved token to {:?}", path);
        Ok(())
    }

    /// Whether the access token has passed (or is about to pass) its expiry
    pub fn is_expired(&self) -> bool {
        self.expiry
            .is_some_and(|exp| Utc::now() + ChronoDuration::seconds(EXPIRY_SKEW_SECS) >= exp)
    }

    /// Usable without a refresh
    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && !self.is_expired()
    }
}

/// OAuth client secret downloaded from the Google Cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// `credentials.json` wraps the secret in an `installed` or `web` key
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Load `credentials.json`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AlertsError::Auth(format!("Cannot read client secrets {:?}: {}", path, e))
        })?;
        Self::from_json(&content)
    }

    /// Parse the contents of a client secrets file
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(content)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| AlertsError::Auth("Client secrets contain neither 'installed' nor 'web'".to_string()))
    }

    /// Consent URL for the authorization-code flow
    pub fn authorization_url(&self, redirect_uri: &str, scopes: &[String], state: &str) -> Result<Url> {
        let mut url = Url::parse(&self.auth_uri)
            .map_err(|e| AlertsError::Config(format!("Invalid auth URI '{}': {}", self.auth_uri, e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

/// Query string Google appends to the loopback redirect
#[derive(Debug, Clone, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Return a valid access token, refreshing or re-authorizing as needed.
///
/// Any new or refreshed token is written back to `config.token_path`.
pub async fn authorize(config: &PipelineConfig) -> Result<StoredToken> {
    let client = build_http_client()?;
    let existing = StoredToken::load(&config.token_path)?;

    let token = match existing {
        Some(token) if token.is_valid() => {
            debug!("Using stored access token");
            return Ok(token);
        }
        Some(token) if token.is_expired() && token.refresh_token.is_some() => {
            info!("Access token expired, refreshing");
            refresh(&client, token).await?
        }
        _ => {
            let secrets = ClientSecrets::load(&config.credentials_path)?;
            installed_app_flow(&client, &secrets, &config.scopes).await?
        }
    };

    token.save(&config.token_path)?;
    Ok(token)
}

fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| AlertsError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Exchange the refresh token for a new access token
pub async fn refresh(client: &reqwest::Client, token: StoredToken) -> Result<StoredToken> {
    let refresh_token = token
        .refresh_token
        .clone()
        .ok_or_else(|| AlertsError::Auth("No refresh token available".to_string()))?;

    let params = [
        ("client_id", token.client_id.as_str()),
        ("client_secret", token.client_secret.as_str()),
        ("refresh_token", refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];
    let response = request_token(client, &token.token_uri, &params).await?;

    Ok(StoredToken {
        token: response.access_token,
        refresh_token: response.refresh_token.or(Some(refresh_token)),
        expiry: expiry_from(response.expires_in),
        scopes: response
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or(token.scopes),
        ..token
    })
}

async fn request_token(
    client: &reqwest::Client,
    token_uri: &str,
    params: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = client.post(token_uri).form(params).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AlertsError::Auth(format!("Token request failed ({}): {}", status, body)));
    }

    Ok(response.json().await?)
}

fn expiry_from(expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in.map(|secs| Utc::now() + ChronoDuration::seconds(secs))
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}

/// Run the browser consent flow with a loopback redirect on an ephemeral port.
async fn installed_app_flow(
    client: &reqwest::Client,
    secrets: &ClientSecrets,
    scopes: &[String],
) -> Result<StoredToken> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://localhost:{}/", port);
    let state = random_state();

    let auth_url = secrets.authorization_url(&redirect_uri, scopes, &state)?;
    println!("Please visit this URL to authorize this application:\n{}", auth_url);

    let params = wait_for_callback(listener).await?;

    if let Some(error) = params.error {
        return Err(AlertsError::Auth(format!("Authorization denied: {}", error)));
    }
    if params.state.as_deref() != Some(state.as_str()) {
        return Err(AlertsError::Auth("State mismatch in authorization response".to_string()));
    }
    let code = params
        .code
        .ok_or_else(|| AlertsError::Auth("Authorization response carried no code".to_string()))?;

    let form = [
        ("code", code.as_str()),
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("grant_type", "authorization_code"),
    ];
    let response = request_token(client, &secrets.token_uri, &form).await?;
    info!("Authorization complete");

    Ok(StoredToken {
        token: response.access_token,
        refresh_token: response.refresh_token,
        token_uri: secrets.token_uri.clone(),
        client_id: secrets.client_id.clone(),
        client_secret: secrets.client_secret.clone(),
        scopes: scopes.to_vec(),
        expiry: expiry_from(response.expires_in),
    })
}

/// Serve `/` until the browser is redirected back, then shut down.
async fn wait_for_callback(listener: tokio::net::TcpListener) -> Result<CallbackParams> {
    let (tx, mut rx) = mpsc::channel::<CallbackParams>(1);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = Router::new()
        .route("/", get(callback_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(tx);

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let params = rx
        .recv()
        .await
        .ok_or_else(|| AlertsError::Auth("Redirect listener closed before a response arrived".to_string()))?;

    let _ = shutdown_tx.send(());
    if tokio::time::timeout(Duration::from_secs(5), server).await.is_err() {
        warn!("Redirect listener did not shut down cleanly");
    }

    Ok(params)
}

async fn callback_handler(
    State(tx): State<mpsc::Sender<CallbackParams>>,
    Query(params): Query<CallbackParams>,
) -> &'static str {
    if tx.send(params).await.is_err() {
        warn!("Authorization response arrived after the flow finished");
    }
    "The authentication flow has completed. You may close this window."
}
