//! Media assets.
//!
//! Media files live on the published branch under the media folder. Writes
//! are single-file commits and the last one wins: uploading over an existing
//! asset replaces it, and a commit that loses a race with another writer is
//! redone against the new version a bounded number of times.

use crate::error::{BackendError, BackendResult};
use crate::host::{CommitOutcome, HostApi, content_hash};
use crate::retry::{RetryConfig, with_retry, with_retry_when};
use folio_model::{CommitRequest, MediaFile};
use std::sync::Arc;
use tracing::{debug, info};

/// Times an upload or delete is redone after losing a race.
const MAX_RACES: usize = 3;

/// Stores binary assets on one host.
#[derive(Clone)]
pub struct MediaHandler {
    host: Arc<dyn HostApi>,
    folder: String,
    retry: RetryConfig,
}

impl MediaHandler {
    pub fn new(host: Arc<dyn HostApi>, folder: &str, retry: RetryConfig) -> Self {
        Self {
            host,
            folder: folder.trim_matches('/').to_string(),
            retry,
        }
    }

    /// Default folder for uploads.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    fn branch(&self) -> &str {
        self.host.default_branch()
    }

    pub async fn persist(&self, mut file: MediaFile) -> BackendResult<MediaFile> {
        if file.path.trim_matches('/').is_empty() {
            return Err(BackendError::Validation("media path is empty".to_string()));
        }
        // A bare file name goes into the media folder.
        if !file.path.contains('/') && !self.folder.is_empty() {
            file.path = format!("{}/{}", self.folder, file.path);
        }

        let mut races = 0;
        let outcome = loop {
            let current = self.current_hash(&file.path).await?;
            let request = CommitRequest::new(self.branch(), format!("Upload “{}”", file.path))
                .write(file.path.clone(), file.content.clone(), current);
            match self.commit(&request).await {
                Err(BackendError::Conflict { .. }) if races < MAX_RACES => {
                    races += 1;
                    debug!("Media {} changed during upload, writing again", file.path);
                }
                result => break result?,
            }
        };

        file.content_hash = Some(
            outcome
                .hashes
                .get(&file.path)
                .cloned()
                .unwrap_or_else(|| content_hash(&file.content)),
        );
        info!("Stored media {} ({} bytes)", file.path, file.content.len());
        Ok(file)
    }

    /// Removes an asset; an absent asset counts as removed.
    pub async fn delete(&self, path: &str) -> BackendResult<()> {
        let mut races = 0;
        loop {
            let Some(current) = self.current_hash(path).await? else {
                debug!("Media {} already absent", path);
                return Ok(());
            };
            let request = CommitRequest::new(self.branch(), format!("Delete “{path}”"))
                .delete(path, Some(current));
            match self.commit(&request).await {
                Ok(_) => {
                    info!("Deleted media {}", path);
                    return Ok(());
                }
                Err(BackendError::NotFound(_)) => return Ok(()),
                Err(BackendError::Conflict { .. }) if races < MAX_RACES => {
                    races += 1;
                    debug!("Media {} changed during delete, trying again", path);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn current_hash(&self, path: &str) -> BackendResult<Option<String>> {
        with_retry(&self.retry, None, "media hash", || {
            self.host.file_hash(self.branch(), path)
        })
        .await
    }

    async fn commit(&self, request: &CommitRequest) -> BackendResult<CommitOutcome> {
        with_retry_when(
            &self.retry,
            None,
            "media commit",
            BackendError::is_refused,
            || self.host.commit(request),
        )
        .await
    }

    /// Assets directly inside `folder` (the media folder when `None`),
    /// without their content.
    pub async fn list(&self, folder: Option<&str>) -> BackendResult<Vec<MediaFile>> {
        let folder = folder.map(|f| f.trim_matches('/')).unwrap_or(&self.folder);
        let files = with_retry(&self.retry, None, "list media", || {
            self.host.list_files(self.branch(), folder, 1)
        })
        .await?;
        Ok(files
            .into_iter()
            .map(|remote| MediaFile {
                path: remote.path,
                content: Vec::new(),
                content_hash: remote.hash,
            })
            .collect())
    }

    pub async fn read(&self, path: &str) -> BackendResult<MediaFile> {
        let file = with_retry(&self.retry, None, "read media", || {
            self.host.read_file(self.branch(), path)
        })
        .await?;
        Ok(MediaFile {
            path: file.path,
            content: file.content,
            content_hash: file.content_hash,
        })
    }
}
