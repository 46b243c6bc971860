//! [`Backend`] over any [`HostApi`].
//!
//! Composes the pieces every host shares: entry layout through the
//! serializer, saves through the orchestrator, unpublished entries through
//! the workflow manager and assets through the media handler.

use crate::backend::{Backend, EntryStream, PersistOptions, UnpublishedEntry};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::host::HostApi;
use crate::media::MediaHandler;
use crate::orchestrator::{SaveOrchestrator, SavePlan};
use crate::retry::with_retry;
use crate::workflow::WorkflowManager;
use async_trait::async_trait;
use folio_format::EntrySerializer;
use folio_format::layout::entry_path;
use folio_model::{
    BaseHash, Collection, CollectionStorage, Entry, I18nStructure, MediaFile, PersistedFile,
    WorkflowStatus,
};
use futures::future::join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A backend that stores entries in a repository reached through a host adapter.
pub struct HostedBackend {
    name: String,
    host: Arc<dyn HostApi>,
    serializer: EntrySerializer,
    orchestrator: SaveOrchestrator,
    workflow: Option<WorkflowManager>,
    media: MediaHandler,
}

impl HostedBackend {
    /// Builds the backend registered as `name` on top of `host`.
    ///
    /// The editorial workflow needs branches; hosts without them only
    /// support the simple publish mode.
    pub fn new(name: &str, config: &BackendConfig, host: Arc<dyn HostApi>) -> BackendResult<Self> {
        if config.is_editorial() && !host.capabilities().branches {
            return Err(BackendError::Unsupported(format!(
                "{} cannot run the editorial workflow without branches",
                host.provider_name()
            )));
        }
        let orchestrator = SaveOrchestrator::new(host.clone(), config.retry.clone());
        let workflow = config
            .is_editorial()
            .then(|| WorkflowManager::new(orchestrator.clone()));
        let media = MediaHandler::new(host.clone(), &config.media_folder, config.retry.clone());
        info!(
            "Backend {} ready on {} ({:?})",
            name,
            host.provider_name(),
            config.publish_mode
        );
        Ok(Self {
            name: name.to_string(),
            host,
            serializer: EntrySerializer::new(),
            orchestrator,
            workflow,
            media,
        })
    }

    pub fn host(&self) -> &Arc<dyn HostApi> {
        &self.host
    }

    pub fn workflow(&self) -> Option<&WorkflowManager> {
        self.workflow.as_ref()
    }

    fn require_workflow(&self) -> BackendResult<&WorkflowManager> {
        self.workflow.as_ref().ok_or_else(|| {
            BackendError::Unsupported(format!(
                "{} is not configured for the editorial workflow",
                self.name
            ))
        })
    }

    /// Default-locale paths of the entries on the published branch.
    async fn entry_paths(&self, collection: &Collection) -> BackendResult<Vec<String>> {
        let branch = self.host.default_branch();
        let mut paths = match &collection.storage {
            CollectionStorage::Folder(_) => {
                let folder = collection.folder_path().unwrap_or_default();
                let depth = match collection.i18n().map(|c| c.structure) {
                    Some(I18nStructure::MultipleFolders) => 2,
                    _ => 1,
                };
                let files = with_retry(self.orchestrator.retry(), None, "list files", || {
                    self.host.list_files(branch, folder, depth)
                })
                .await?;
                files
                    .into_iter()
                    .map(|f| f.path)
                    .filter(|path| self.serializer.is_entry_path(collection, path))
                    .collect::<Vec<_>>()
            }
            CollectionStorage::Files(files) => {
                let paths = files
                    .iter()
                    .map(|f| entry_path(collection, &f.name))
                    .collect::<Result<Vec<_>, _>>()?;
                let hashes = join_all(paths.iter().map(|path| {
                    with_retry(self.orchestrator.retry(), None, "file hash", move || {
                        self.host.file_hash(branch, path)
                    })
                }))
                .await;
                let mut existing = Vec::new();
                for (path, hash) in paths.into_iter().zip(hashes) {
                    if hash?.is_some() {
                        existing.push(path);
                    }
                }
                existing
            }
        };
        paths.sort();
        debug!("Found {} entries in {}", paths.len(), collection.name);
        Ok(paths)
    }

    /// Reads every locale file of the entry at `path` on `branch`.
    async fn read_on(
        &self,
        collection: &Collection,
        branch: &str,
        path: &str,
    ) -> BackendResult<Entry> {
        let slug = self
            .serializer
            .slug_for_path(collection, path)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        let paths = self.serializer.entry_paths(collection, &slug)?;

        let reads = join_all(paths.iter().map(|p| {
            with_retry(self.orchestrator.retry(), None, "read file", move || {
                self.host.read_file(branch, p)
            })
        }))
        .await;

        let mut files = Vec::with_capacity(paths.len());
        for (index, read) in reads.into_iter().enumerate() {
            match read {
                Ok(file) => files.push(file),
                // Only the default locale file is mandatory.
                Err(BackendError::NotFound(_)) if index > 0 => {}
                Err(BackendError::NotFound(_)) => {
                    return Err(BackendError::NotFound(path.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.serializer.deserialize(collection, &files)?)
    }

    async fn current_hashes(&self, paths: &[String]) -> BackendResult<BaseHash> {
        let branch = self.host.default_branch();
        let hashes = join_all(paths.iter().map(|path| {
            with_retry(self.orchestrator.retry(), None, "resolve hash", move || {
                self.host.file_hash(branch, path)
            })
        }))
        .await;
        let mut base_hash = BaseHash::new();
        for (path, hash) in paths.iter().zip(hashes) {
            if let Some(hash) = hash? {
                base_hash.insert(path.clone(), hash);
            }
        }
        Ok(base_hash)
    }
}

fn default_message(entry: &Entry, is_new: bool) -> String {
    let verb = if is_new { "Create" } else { "Update" };
    format!("{verb} {} “{}”", entry.collection, entry.slug)
}

#[async_trait]
impl Backend for HostedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_entries<'a>(&'a self, collection: &'a Collection) -> EntryStream<'a> {
        let branch = self.host.default_branch();
        stream::once(self.entry_paths(collection))
            .map_ok(|paths| stream::iter(paths.into_iter().map(Ok)))
            .try_flatten()
            .and_then(move |path| async move { self.read_on(collection, branch, &path).await })
            .boxed()
    }

    async fn read_entry(&self, collection: &Collection, path: &str) -> BackendResult<Entry> {
        self.read_on(collection, self.host.default_branch(), path)
            .await
    }

    async fn persist_entry(
        &self,
        entry: &Entry,
        files: Vec<PersistedFile>,
        options: PersistOptions,
    ) -> BackendResult<BaseHash> {
        if entry.path.is_empty() {
            return Err(BackendError::Validation(format!(
                "entry of `{}` has no path",
                entry.collection
            )));
        }
        if files.is_empty() {
            return Err(BackendError::Validation(format!(
                "no files to save for {}",
                entry.path
            )));
        }
        let is_new = options.is_new_entry;
        let message = options
            .commit_message
            .clone()
            .unwrap_or_else(|| default_message(entry, is_new));
        let plan = SavePlan::new(self.host.default_branch(), message)
            .with_writes(files)
            .with_base_hash(entry.base_hash.clone())
            .new_entry(is_new);

        match &self.workflow {
            Some(workflow) => {
                workflow
                    .save(&entry.collection, &entry.path, plan, &options.cancel)
                    .await
            }
            None => self.orchestrator.save(plan, &options.cancel).await,
        }
    }

    async fn delete_entry(&self, collection: &Collection, path: &str) -> BackendResult<()> {
        let slug = self
            .serializer
            .slug_for_path(collection, path)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        let paths = self.serializer.entry_paths(collection, &slug)?;
        let base_hash = self.current_hashes(&paths).await?;
        if base_hash.is_empty() {
            return Err(BackendError::NotFound(path.to_string()));
        }

        let plan = SavePlan::new(
            self.host.default_branch(),
            format!("Delete {} “{}”", collection.name, slug),
        )
        .with_deletes(base_hash.paths().map(str::to_string).collect())
        .with_base_hash(base_hash);
        self.orchestrator
            .save(plan, &CancellationToken::new())
            .await?;
        Ok(())
    }

    async fn persist_media(&self, file: MediaFile) -> BackendResult<MediaFile> {
        self.media.persist(file).await
    }

    async fn delete_media(&self, path: &str) -> BackendResult<()> {
        self.media.delete(path).await
    }

    async fn list_media(&self, folder: Option<&str>) -> BackendResult<Vec<MediaFile>> {
        self.media.list(folder).await
    }

    async fn read_media(&self, path: &str) -> BackendResult<MediaFile> {
        self.media.read(path).await
    }

    async fn unpublished_entries(
        &self,
        collection: &Collection,
    ) -> BackendResult<Vec<UnpublishedEntry>> {
        let Some(workflow) = &self.workflow else {
            return Ok(Vec::new());
        };
        let requests = workflow.change_requests(Some(collection.name.as_str())).await?;
        let entries = join_all(
            requests
                .iter()
                .map(|r| self.read_on(collection, &r.branch, &r.entry_path)),
        )
        .await;
        requests
            .into_iter()
            .zip(entries)
            .map(|(request, entry)| {
                Ok(UnpublishedEntry {
                    entry: entry?,
                    status: request.status,
                })
            })
            .collect()
    }

    async fn update_unpublished_entry_status(
        &self,
        path: &str,
        status: WorkflowStatus,
    ) -> BackendResult<()> {
        self.require_workflow()?.update_status(path, status).await
    }

    async fn publish_unpublished_entry(&self, path: &str) -> BackendResult<()> {
        self.require_workflow()?.publish(path).await
    }

    async fn delete_unpublished_entry(&self, path: &str) -> BackendResult<()> {
        self.require_workflow()?.discard(path).await
    }
}
