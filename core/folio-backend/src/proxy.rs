//! Proxy transport.
//!
//! Every contract call travels as one HTTP POST of
//! `{"action": "<operation>", "params": {...}}`. The server answers with the
//! JSON result, or with a non-2xx status and an [`ErrorResponse`] body.
//! [`dispatch`] is the server half; [`ProxyBackend`] the client half.

use crate::backend::{Backend, EntryStream, PersistOptions, UnpublishedEntry};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult, ErrorResponse};
use crate::host::http::{build_client, status_error, trim_root};
use async_trait::async_trait;
use folio_model::{BaseHash, Collection, Entry, MediaFile, PersistedFile, WorkflowStatus};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// One contract call on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "camelCase")]
pub enum ProxyRequest {
    ListEntries {
        collection: Collection,
    },
    ReadEntry {
        collection: Collection,
        path: String,
    },
    PersistEntry {
        entry: Entry,
        files: Vec<PersistedFile>,
        #[serde(default)]
        options: PersistOptions,
    },
    DeleteEntry {
        collection: Collection,
        path: String,
    },
    PersistMedia {
        file: MediaFile,
    },
    DeleteMedia {
        path: String,
    },
    ListMedia {
        #[serde(default)]
        folder: Option<String>,
    },
    ReadMedia {
        path: String,
    },
    UnpublishedEntries {
        collection: Collection,
    },
    UpdateUnpublishedEntryStatus {
        path: String,
        status: WorkflowStatus,
    },
    PublishUnpublishedEntry {
        path: String,
    },
    DeleteUnpublishedEntry {
        path: String,
    },
}

impl ProxyRequest {
    /// Wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            Self::ListEntries { .. } => "listEntries",
            Self::ReadEntry { .. } => "readEntry",
            Self::PersistEntry { .. } => "persistEntry",
            Self::DeleteEntry { .. } => "deleteEntry",
            Self::PersistMedia { .. } => "persistMedia",
            Self::DeleteMedia { .. } => "deleteMedia",
            Self::ListMedia { .. } => "listMedia",
            Self::ReadMedia { .. } => "readMedia",
            Self::UnpublishedEntries { .. } => "unpublishedEntries",
            Self::UpdateUnpublishedEntryStatus { .. } => "updateUnpublishedEntryStatus",
            Self::PublishUnpublishedEntry { .. } => "publishUnpublishedEntry",
            Self::DeleteUnpublishedEntry { .. } => "deleteUnpublishedEntry",
        }
    }
}

/// Runs one request against `backend` and returns its JSON result.
pub async fn dispatch(backend: &dyn Backend, request: ProxyRequest) -> BackendResult<Value> {
    debug!("Dispatching {}", request.action());
    let value = match request {
        ProxyRequest::ListEntries { collection } => {
            let entries: Vec<Entry> = backend.list_entries(&collection).try_collect().await?;
            serde_json::to_value(entries)?
        }
        ProxyRequest::ReadEntry { collection, path } => {
            serde_json::to_value(backend.read_entry(&collection, &path).await?)?
        }
        ProxyRequest::PersistEntry {
            entry,
            files,
            options,
        } => serde_json::to_value(backend.persist_entry(&entry, files, options).await?)?,
        ProxyRequest::DeleteEntry { collection, path } => {
            backend.delete_entry(&collection, &path).await?;
            Value::Null
        }
        ProxyRequest::PersistMedia { file } => {
            serde_json::to_value(backend.persist_media(file).await?)?
        }
        ProxyRequest::DeleteMedia { path } => {
            backend.delete_media(&path).await?;
            Value::Null
        }
        ProxyRequest::ListMedia { folder } => {
            serde_json::to_value(backend.list_media(folder.as_deref()).await?)?
        }
        ProxyRequest::ReadMedia { path } => serde_json::to_value(backend.read_media(&path).await?)?,
        ProxyRequest::UnpublishedEntries { collection } => {
            serde_json::to_value(backend.unpublished_entries(&collection).await?)?
        }
        ProxyRequest::UpdateUnpublishedEntryStatus { path, status } => {
            backend.update_unpublished_entry_status(&path, status).await?;
            Value::Null
        }
        ProxyRequest::PublishUnpublishedEntry { path } => {
            backend.publish_unpublished_entry(&path).await?;
            Value::Null
        }
        ProxyRequest::DeleteUnpublishedEntry { path } => {
            backend.delete_unpublished_entry(&path).await?;
            Value::Null
        }
    };
    Ok(value)
}

/// Client of a proxy server.
pub struct ProxyBackend {
    client: Client,
    url: String,
}

impl ProxyBackend {
    /// Connects to the server at `config.proxy_url`.
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let url = config
            .proxy_url
            .as_deref()
            .ok_or_else(|| BackendError::Validation("proxy needs a proxy_url".to_string()))?;
        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            url: trim_root(url),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, request: &ProxyRequest) -> BackendResult<T> {
        let action = request.action();
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Network(format!("{action}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(error) => error.error.into(),
                Err(_) => status_error(status, &headers, &body, action),
            });
        }
        response
            .json()
            .await
            .map_err(|e| BackendError::Network(format!("failed to parse {action} response: {e}")))
    }
}

#[async_trait]
impl Backend for ProxyBackend {
    fn name(&self) -> &str {
        "proxy"
    }

    fn list_entries<'a>(&'a self, collection: &'a Collection) -> EntryStream<'a> {
        stream::once(async move {
            self.call::<Vec<Entry>>(&ProxyRequest::ListEntries {
                collection: collection.clone(),
            })
            .await
        })
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    async fn read_entry(&self, collection: &Collection, path: &str) -> BackendResult<Entry> {
        self.call(&ProxyRequest::ReadEntry {
            collection: collection.clone(),
            path: path.to_string(),
        })
        .await
    }

    async fn persist_entry(
        &self,
        entry: &Entry,
        files: Vec<PersistedFile>,
        options: PersistOptions,
    ) -> BackendResult<BaseHash> {
        // Cancellation does not cross the wire; a cancelled token stops the
        // request from being sent at all.
        if options.cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        self.call(&ProxyRequest::PersistEntry {
            entry: entry.clone(),
            files,
            options,
        })
        .await
    }

    async fn delete_entry(&self, collection: &Collection, path: &str) -> BackendResult<()> {
        self.call(&ProxyRequest::DeleteEntry {
            collection: collection.clone(),
            path: path.to_string(),
        })
        .await
    }

    async fn persist_media(&self, file: MediaFile) -> BackendResult<MediaFile> {
        self.call(&ProxyRequest::PersistMedia { file }).await
    }

    async fn delete_media(&self, path: &str) -> BackendResult<()> {
        self.call(&ProxyRequest::DeleteMedia {
            path: path.to_string(),
        })
        .await
    }

    async fn list_media(&self, folder: Option<&str>) -> BackendResult<Vec<MediaFile>> {
        self.call(&ProxyRequest::ListMedia {
            folder: folder.map(str::to_string),
        })
        .await
    }

    async fn read_media(&self, path: &str) -> BackendResult<MediaFile> {
        self.call(&ProxyRequest::ReadMedia {
            path: path.to_string(),
        })
        .await
    }

    async fn unpublished_entries(
        &self,
        collection: &Collection,
    ) -> BackendResult<Vec<UnpublishedEntry>> {
        self.call(&ProxyRequest::UnpublishedEntries {
            collection: collection.clone(),
        })
        .await
    }

    async fn update_unpublished_entry_status(
        &self,
        path: &str,
        status: WorkflowStatus,
    ) -> BackendResult<()> {
        self.call(&ProxyRequest::UpdateUnpublishedEntryStatus {
            path: path.to_string(),
            status,
        })
        .await
    }

    async fn publish_unpublished_entry(&self, path: &str) -> BackendResult<()> {
        self.call(&ProxyRequest::PublishUnpublishedEntry {
            path: path.to_string(),
        })
        .await
    }

    async fn delete_unpublished_entry(&self, path: &str) -> BackendResult<()> {
        self.call(&ProxyRequest::DeleteUnpublishedEntry {
            path: path.to_string(),
        })
        .await
    }
}
