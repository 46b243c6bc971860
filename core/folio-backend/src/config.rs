//! Backend configuration.
//!
//! [`BackendConfig`] is plain data and may be loaded from the site
//! configuration. Secrets travel separately in [`Credentials`], which is
//! never serialized.

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How saved entries reach the published branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Saves commit straight to the published branch.
    #[default]
    Simple,
    /// Saves go to a per-entry branch plus change request and are
    /// published through draft → review → publish.
    EditorialWorkflow,
}

/// Configuration shared by every backend kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Registry identifier of the backend (`github`, `gitlab`, ...).
    pub name: String,
    /// Repository: `owner/name`, or `organization/project/name` for Azure DevOps.
    pub repo: String,
    /// Published branch.
    pub branch: String,
    /// Overrides the provider's public API root.
    pub api_root: Option<String>,
    pub publish_mode: PublishMode,
    /// Prefix of change request labels (and Bitbucket status comments).
    pub cms_label_prefix: String,
    /// Default folder for media uploads.
    pub media_folder: String,
    /// Gateway root for `git-gateway`, e.g. `https://example.com/.netlify/git`.
    pub gateway_url: Option<String>,
    /// Identity service that issues gateway tokens.
    pub identity_url: Option<String>,
    /// Endpoint of a proxy server for the `proxy` backend.
    pub proxy_url: Option<String>,
    /// Working tree for disk-backed stores.
    pub local_root: Option<PathBuf>,
    /// HTTP request timeout.
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: "test-repo".to_string(),
            repo: String::new(),
            branch: "main".to_string(),
            api_root: None,
            publish_mode: PublishMode::Simple,
            cms_label_prefix: "folio/".to_string(),
            media_folder: "static/media".to_string(),
            gateway_url: None,
            identity_url: None,
            proxy_url: None,
            local_root: None,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl BackendConfig {
    /// Shorthand for a backend of kind `name` on `repo`.
    pub fn new(name: &str, repo: &str) -> Self {
        Self {
            name: name.to_string(),
            repo: repo.to_string(),
            ..Default::default()
        }
    }

    pub fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = Some(api_root.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_publish_mode(mut self, mode: PublishMode) -> Self {
        self.publish_mode = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_editorial(&self) -> bool {
        self.publish_mode == PublishMode::EditorialWorkflow
    }
}

/// Host credentials, supplied at construction.
#[derive(Clone, Default)]
pub struct Credentials {
    /// OAuth or personal access token.
    pub token: Option<String>,
    /// Refresh token for hosts that issue short-lived tokens.
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            refresh_token: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("token", &redact(&self.token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}
