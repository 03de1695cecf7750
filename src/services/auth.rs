//! Bearer token acquisition for Microsoft Graph

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::GraphConfig;
use crate::utils::{AppError, AppResult};

/// Source of bearer tokens for the management API
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> AppResult<String>;
}

/// A pre-acquired token, e.g. from `az account get-access-token`
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> AppResult<String> {
        if self.token.trim().is_empty() {
            return Err(AppError::Auth("no access token configured".to_string()));
        }
        Ok(self.token.clone())
    }
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// OAuth2 client-credentials grant against the tenant's token endpoint.
///
/// Tokens are reused until 60 seconds before they expire.
pub struct ClientCredentialsProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    cached: Arc<RwLock<Option<CachedToken>>>,
}

impl ClientCredentialsProvider {
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Token endpoint for a tenant under the given authority
    pub fn token_url(authority_url: &str, tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            authority_url.trim_end_matches('/'),
            tenant_id
        )
    }

    async fn request_token(&self) -> AppResult<CachedToken> {
        info!("Fetching new Graph access token");

        let scope = self.scopes.join(" ");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Auth(format!(
                "token endpoint refused the request: {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("invalid token response: {}", e)))?;

        Ok(CachedToken {
            access_token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn access_token(&self) -> AppResult<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let fresh = self.request_token().await?;
        debug!("Caching Graph access token");
        let token = fresh.access_token.clone();
        *self.cached.write().await = Some(fresh);
        Ok(token)
    }
}

/// Pick a provider for the configured credentials.
///
/// A static token takes precedence over client credentials.
pub fn provider_from_config(
    config: &GraphConfig,
    client: reqwest::Client,
) -> AppResult<Arc<dyn TokenProvider>> {
    if let Some(token) = config.access_token.as_deref().filter(|t| !t.trim().is_empty()) {
        return Ok(Arc::new(StaticTokenProvider::new(token)));
    }

    match (&config.tenant_id, &config.client_id, &config.client_secret) {
        (Some(tenant), Some(client_id), Some(secret)) if config.has_client_credentials() => {
            Ok(Arc::new(ClientCredentialsProvider::new(
                client,
                ClientCredentialsProvider::token_url(&config.authority_url, tenant),
                client_id,
                secret,
                config.scopes.clone(),
            )))
        }
        _ => Err(AppError::Config(
            "no Graph credentials configured".to_string(),
        )),
    }
}
