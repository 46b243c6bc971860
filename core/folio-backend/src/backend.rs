//! The capability contract every backend exposes.

use crate::error::BackendResult;
use async_trait::async_trait;
use folio_model::{BaseHash, Collection, Entry, MediaFile, PersistedFile, WorkflowStatus};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Lazily produced entries of one collection.
pub type EntryStream<'a> = BoxStream<'a, BackendResult<Entry>>;

/// Options for [`Backend::persist_entry`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistOptions {
    /// Commit message; backends derive one from the entry when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    /// The entry must not exist remotely yet.
    #[serde(default)]
    pub is_new_entry: bool,
    /// Aborts the save while it is still resolving remote state.
    #[serde(skip)]
    pub cancel: CancellationToken,
}

impl PersistOptions {
    pub fn new_entry() -> Self {
        Self {
            is_new_entry: true,
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = Some(message.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// An entry that lives on its own change-set, not yet merged into the
/// published branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnpublishedEntry {
    pub entry: Entry,
    pub status: WorkflowStatus,
}

/// Storage-engine view of a content repository.
///
/// All operations are async and fail with [`BackendError`](crate::BackendError).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Registry identifier of this backend.
    fn name(&self) -> &str;

    /// Lists the published entries of a collection.
    ///
    /// Nothing is fetched until the stream is polled, and every call starts
    /// a fresh listing.
    fn list_entries<'a>(&'a self, collection: &'a Collection) -> EntryStream<'a>;

    /// Reads one published entry by the path of its default locale file.
    async fn read_entry(&self, collection: &Collection, path: &str) -> BackendResult<Entry>;

    /// Writes all files of an entry as one logical change.
    ///
    /// `entry.base_hash` must be the state observed at the last read or
    /// write; any remote difference fails with `Conflict`. Returns the base
    /// hash to use for the next save.
    async fn persist_entry(
        &self,
        entry: &Entry,
        files: Vec<PersistedFile>,
        options: PersistOptions,
    ) -> BackendResult<BaseHash>;

    /// Deletes every locale file of an entry, all or nothing.
    async fn delete_entry(&self, collection: &Collection, path: &str) -> BackendResult<()>;

    /// Stores a media file on the published branch.
    async fn persist_media(&self, file: MediaFile) -> BackendResult<MediaFile>;

    /// Removes a media file; an already absent file counts as removed.
    async fn delete_media(&self, path: &str) -> BackendResult<()>;

    /// Media files in `folder` (the configured media folder when `None`),
    /// without their content.
    async fn list_media(&self, folder: Option<&str>) -> BackendResult<Vec<MediaFile>>;

    async fn read_media(&self, path: &str) -> BackendResult<MediaFile>;

    /// Entries of a collection that have an open change-set.
    async fn unpublished_entries(
        &self,
        collection: &Collection,
    ) -> BackendResult<Vec<UnpublishedEntry>>;

    /// Moves an unpublished entry to the next status. Moving to
    /// `Published` publishes it.
    async fn update_unpublished_entry_status(
        &self,
        path: &str,
        status: WorkflowStatus,
    ) -> BackendResult<()>;

    /// Fast-forwards the published branch to the entry's change-set.
    async fn publish_unpublished_entry(&self, path: &str) -> BackendResult<()>;

    /// Drops an entry's change-set without publishing it.
    async fn delete_unpublished_entry(&self, path: &str) -> BackendResult<()>;
}
