//! Git gateway.
//!
//! A gateway proxies one provider's repository API under
//! `{gateway_url}/{provider}` and accepts short-lived tokens issued by an
//! identity service. [`connect`] asks the gateway which provider it fronts
//! and returns that provider's host pointed at the gateway.

use super::http::{HttpClient, TokenSource, build_client, trim_root};
use super::{BitbucketHost, GitHubHost, GitLabHost, HostApi};
use crate::config::{BackendConfig, Credentials};
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Providers a gateway reports as enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub github_enabled: bool,
    #[serde(default)]
    pub gitlab_enabled: bool,
    #[serde(default)]
    pub bitbucket_enabled: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
struct GatewayToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<SystemTime>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// Identity-service tokens, refreshed when they expire or are rejected.
pub struct GatewayTokens {
    client: Client,
    identity_url: Option<String>,
    tokens: RwLock<GatewayToken>,
}

impl GatewayTokens {
    pub fn new(
        credentials: &Credentials,
        identity_url: Option<String>,
        timeout: Duration,
    ) -> BackendResult<Self> {
        let access_token = credentials
            .token
            .clone()
            .ok_or_else(|| BackendError::Auth("not authenticated".to_string()))?;
        Ok(Self {
            client: build_client(timeout)?,
            identity_url: identity_url.map(|u| trim_root(&u)),
            tokens: RwLock::new(GatewayToken {
                access_token,
                refresh_token: credentials.refresh_token.clone(),
                expires_at: None,
            }),
        })
    }

    async fn refresh(&self) -> BackendResult<String> {
        let refresh_token = self
            .tokens
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or_else(|| BackendError::Auth("no refresh token available".to_string()))?;
        let identity_url = self
            .identity_url
            .as_deref()
            .ok_or_else(|| BackendError::Auth("no identity service configured".to_string()))?;

        debug!("Refreshing gateway access token");

        let response = self
            .client
            .post(format!("{identity_url}/token"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BackendError::Network(format!("token refresh failed: {e}")))?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(BackendError::Auth(format!("token refresh failed: {error}")));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Auth(format!("failed to parse token response: {e}")))?;

        let expires_at = token_response
            .expires_in
            .map(|secs| SystemTime::now() + Duration::from_secs(secs.saturating_sub(60)));

        *self.tokens.write().await = GatewayToken {
            access_token: token_response.access_token.clone(),
            refresh_token: token_response.refresh_token.or(Some(refresh_token)),
            expires_at,
        };

        Ok(token_response.access_token)
    }
}

#[async_trait]
impl TokenSource for GatewayTokens {
    async fn token(&self) -> BackendResult<String> {
        let (access_token, expired) = {
            let guard = self.tokens.read().await;
            let expired = guard
                .expires_at
                .is_some_and(|exp| SystemTime::now() > exp);
            (guard.access_token.clone(), expired)
        };

        if expired {
            return self.refresh().await;
        }
        Ok(access_token)
    }

    async fn invalidate(&self) {
        let mut guard = self.tokens.write().await;
        if guard.refresh_token.is_some() {
            guard.expires_at = Some(SystemTime::UNIX_EPOCH);
        }
    }
}

/// Reads the gateway's settings.
pub async fn fetch_settings(
    gateway_url: &str,
    tokens: Arc<dyn TokenSource>,
    timeout: Duration,
) -> BackendResult<GatewaySettings> {
    let http = HttpClient::new(tokens, timeout)?;
    let url = format!("{}/settings", trim_root(gateway_url));
    http.json("gateway settings", |c| c.get(url.as_str())).await
}

/// Connects to the gateway in `config.gateway_url` and returns the host of
/// the provider it fronts.
pub async fn connect(
    config: &BackendConfig,
    credentials: &Credentials,
) -> BackendResult<Arc<dyn HostApi>> {
    let gateway_url = config
        .gateway_url
        .as_deref()
        .map(trim_root)
        .ok_or_else(|| BackendError::Validation("git-gateway needs a gateway_url".to_string()))?;
    let timeout = Duration::from_secs(config.timeout_secs);
    let tokens: Arc<dyn TokenSource> = Arc::new(GatewayTokens::new(
        credentials,
        config.identity_url.clone(),
        timeout,
    )?);

    let settings = fetch_settings(&gateway_url, tokens.clone(), timeout).await?;
    let host: Arc<dyn HostApi> = if settings.github_enabled {
        Arc::new(GitHubHost::with_repo_url(
            format!("{gateway_url}/github"),
            config,
            tokens,
        )?)
    } else if settings.gitlab_enabled {
        Arc::new(GitLabHost::with_project_url(
            format!("{gateway_url}/gitlab"),
            config,
            tokens,
        )?)
    } else if settings.bitbucket_enabled {
        Arc::new(BitbucketHost::with_repo_url(
            format!("{gateway_url}/bitbucket"),
            config,
            tokens,
        )?)
    } else {
        return Err(BackendError::Unsupported(
            "the git gateway has no provider enabled".to_string(),
        ));
    };
    info!(
        "Connected to git gateway at {} ({})",
        gateway_url,
        host.provider_name()
    );
    Ok(host)
}
