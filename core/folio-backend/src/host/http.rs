//! Shared HTTP plumbing for the REST host adapters.

use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Supplies the bearer token for each request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> BackendResult<String>;

    /// Called after the host rejected the current token.
    async fn invalidate(&self) {}
}

/// A long-lived token handed over at construction.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> BackendResult<String> {
        if self.0.is_empty() {
            return Err(BackendError::Auth("no token configured".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// Authenticated HTTP access shared by one adapter.
#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Client,
    tokens: Arc<dyn TokenSource>,
}

impl HttpClient {
    pub(crate) fn new(tokens: Arc<dyn TokenSource>, timeout: Duration) -> BackendResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            tokens,
        })
    }

    pub(crate) fn raw(&self) -> &Client {
        &self.client
    }

    /// Sends an authenticated request and normalizes error statuses.
    ///
    /// `build` is called again when the first attempt is rejected with 401
    /// and the token source could refresh its token.
    pub(crate) async fn send<F>(&self, context: &str, build: F) -> BackendResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.tokens.token().await?;
        let response = build(&self.client)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| transport_error(context, e))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            let fresh = self.tokens.token().await?;
            if fresh != token {
                debug!("Retrying {} with a refreshed token", context);
                let response = build(&self.client)
                    .bearer_auth(&fresh)
                    .send()
                    .await
                    .map_err(|e| transport_error(context, e))?;
                return check(response, context).await;
            }
        }
        check(response, context).await
    }

    /// Sends a request that cannot be rebuilt (a streamed or multipart body).
    pub(crate) async fn send_once(
        &self,
        context: &str,
        request: RequestBuilder,
    ) -> BackendResult<Response> {
        let token = self.tokens.token().await?;
        let response = request
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| transport_error(context, e))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        check(response, context).await
    }

    /// Like [`send`](Self::send) and decodes a JSON body.
    pub(crate) async fn json<T, F>(&self, context: &str, build: F) -> BackendResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(context, build).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::Network(format!("failed to parse {context} response: {e}")))
    }

    /// Like [`send`](Self::send), mapping `NotFound` to `None`.
    pub(crate) async fn optional<T, F>(&self, context: &str, build: F) -> BackendResult<Option<T>>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        match self.json(context, build).await {
            Ok(value) => Ok(Some(value)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn build_client(timeout: Duration) -> BackendResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BackendError::Network(format!("failed to create HTTP client: {e}")))
}

/// A connection that was never established cannot have applied anything;
/// other transport failures (timeouts, resets) may have.
fn transport_error(context: &str, err: reqwest::Error) -> BackendError {
    if err.is_connect() {
        BackendError::Unavailable(format!("{context}: {err}"))
    } else {
        BackendError::Network(format!("{context}: {err}"))
    }
}

/// Maps an error status to the backend error taxonomy.
pub(crate) async fn check(response: Response, context: &str) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &headers, &body, context))
}

pub(crate) fn status_error(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    context: &str,
) -> BackendError {
    let detail = if body.is_empty() {
        format!("{context}: {status}")
    } else {
        format!("{context}: {status}: {body}")
    };
    match status.as_u16() {
        401 => BackendError::Auth(detail),
        403 | 429 if status.as_u16() == 429 || is_rate_limited(headers) => {
            BackendError::RateLimited {
                retry_after_secs: retry_after(headers),
            }
        }
        403 => BackendError::Auth(detail),
        404 => BackendError::NotFound(context.to_string()),
        409 | 412 | 422 => BackendError::Conflict {
            path: context.to_string(),
            expected: None,
            actual: None,
        },
        503 => BackendError::Unavailable(detail),
        500..=599 => BackendError::Network(detail),
        _ => BackendError::Validation(detail),
    }
}

fn is_rate_limited(headers: &HeaderMap) -> bool {
    headers.contains_key("retry-after")
        || headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Percent-encodes every segment of a repository path, keeping the slashes.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// API root without a trailing slash.
pub(crate) fn trim_root(root: &str) -> String {
    root.trim_end_matches('/').to_string()
}
