//! Backend registry.
//!
//! Backends are constructed by identifier through a [`BackendRegistry`]
//! that the application builds once at startup and passes by reference.

use crate::backend::Backend;
use crate::config::{BackendConfig, Credentials};
use crate::error::{BackendError, BackendResult};
use crate::host::{
    AzureHost, BitbucketHost, GitHubHost, GitLabHost, HostApi, LocalHost, MemoryHost, StaticToken,
    TokenSource, gateway,
};
use crate::hosted::HostedBackend;
use crate::proxy::ProxyBackend;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Builds a backend from its configuration.
pub type BackendFactory = Arc<
    dyn Fn(BackendConfig, Credentials) -> BoxFuture<'static, BackendResult<Arc<dyn Backend>>>
        + Send
        + Sync,
>;

/// Backend kinds that ship with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    GitHub,
    GitLab,
    Bitbucket,
    Azure,
    GitGateway,
    Proxy,
    TestRepo,
    Local,
}

impl BackendKind {
    pub const ALL: [BackendKind; 8] = [
        Self::GitHub,
        Self::GitLab,
        Self::Bitbucket,
        Self::Azure,
        Self::GitGateway,
        Self::Proxy,
        Self::TestRepo,
        Self::Local,
    ];

    pub fn identifier(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Bitbucket => "bitbucket",
            Self::Azure => "azure",
            Self::GitGateway => "git-gateway",
            Self::Proxy => "proxy",
            Self::TestRepo => "test-repo",
            Self::Local => "local",
        }
    }

    fn factory(self) -> BackendFactory {
        Arc::new(move |config, credentials| build(self, config, credentials).boxed())
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.identifier() == s)
            .ok_or_else(|| BackendError::Unsupported(format!("unknown backend `{s}`")))
    }
}

fn static_token(kind: BackendKind, credentials: &Credentials) -> BackendResult<Arc<dyn TokenSource>> {
    let token = credentials
        .token
        .clone()
        .ok_or_else(|| BackendError::Auth(format!("{kind} needs an access token")))?;
    Ok(Arc::new(StaticToken::new(token)))
}

async fn build(
    kind: BackendKind,
    config: BackendConfig,
    credentials: Credentials,
) -> BackendResult<Arc<dyn Backend>> {
    let host: Arc<dyn HostApi> = match kind {
        BackendKind::GitHub => Arc::new(GitHubHost::new(
            &config,
            static_token(kind, &credentials)?,
        )?),
        BackendKind::GitLab => Arc::new(GitLabHost::new(
            &config,
            static_token(kind, &credentials)?,
        )?),
        BackendKind::Bitbucket => Arc::new(BitbucketHost::new(
            &config,
            static_token(kind, &credentials)?,
        )?),
        BackendKind::Azure => Arc::new(AzureHost::new(
            &config,
            static_token(kind, &credentials)?,
        )?),
        BackendKind::GitGateway => gateway::connect(&config, &credentials).await?,
        BackendKind::Proxy => return Ok(Arc::new(ProxyBackend::new(&config)?)),
        BackendKind::TestRepo => Arc::new(MemoryHost::new(&config.branch)),
        BackendKind::Local => {
            let root = config.local_root.clone().ok_or_else(|| {
                BackendError::Validation("local backend needs a local_root".to_string())
            })?;
            Arc::new(LocalHost::new(root, &config.branch))
        }
    };
    Ok(Arc::new(HostedBackend::new(kind.identifier(), &config, host)?))
}

/// Backend factories keyed by identifier.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every [`BackendKind`].
    pub fn with_builtin() -> Self {
        let factories = BackendKind::ALL
            .into_iter()
            .map(|kind| (kind.identifier().to_string(), kind.factory()))
            .collect();
        Self { factories }
    }

    /// Registers a factory under `identifier`.
    pub fn register(&mut self, identifier: &str, factory: BackendFactory) -> BackendResult<()> {
        let identifier = identifier.trim();
        if !is_valid_identifier(identifier) {
            return Err(BackendError::Validation(format!(
                "backend identifier is invalid: `{identifier}`"
            )));
        }
        if self.factories.contains_key(identifier) {
            return Err(BackendError::Validation(format!(
                "backend already registered: `{identifier}`"
            )));
        }
        self.factories.insert(identifier.to_string(), factory);
        Ok(())
    }

    /// Sorted identifiers.
    pub fn identifiers(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier.trim())
    }

    /// Builds the backend named by `config.name`.
    pub async fn create(
        &self,
        config: &BackendConfig,
        credentials: Credentials,
    ) -> BackendResult<Arc<dyn Backend>> {
        let factory = self
            .factories
            .get(config.name.trim())
            .ok_or_else(|| BackendError::Unsupported(format!("unknown backend `{}`", config.name)))?;
        let backend = factory(config.clone(), credentials).await?;
        info!("Created backend {}", config.name);
        Ok(backend)
    }
}

fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}
