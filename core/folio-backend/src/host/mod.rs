//! Host adapters.
//!
//! A host adapter speaks one provider's API and exposes the small set of
//! repository primitives the shared orchestration needs: read and hash
//! files, commit a set of changes, manage branches and change requests.
//!
//! - [`GitHubHost`]: blob / tree / commit / ref sequence
//! - [`GitLabHost`]: commits with actions
//! - [`BitbucketHost`]: `/src` multipart commits
//! - [`AzureHost`]: pushes guarded by `oldObjectId`
//! - [`gateway`]: any of the above behind a token-issuing gateway
//! - [`MemoryHost`], [`LocalHost`]: in-memory and on-disk stores writing one file at a time

pub mod azure;
pub mod bitbucket;
pub mod gateway;
pub mod github;
pub mod gitlab;
pub mod local;
pub mod memory;

pub(crate) mod http;

pub use azure::AzureHost;
pub use bitbucket::BitbucketHost;
pub use github::GitHubHost;
pub use gitlab::GitLabHost;
pub use http::{StaticToken, TokenSource};
pub use local::LocalHost;
pub use memory::MemoryHost;

use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use folio_model::{CommitRequest, FileChange, PersistedFile, WorkflowStatus};
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::warn;

/// What a host can do natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// A multi-file commit either lands completely or not at all.
    pub atomic_commits: bool,
    /// Branches and change requests are available.
    pub branches: bool,
}

/// A file found by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    /// Version marker, when the listing provides one.
    pub hash: Option<String>,
}

/// Result of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// New head of the branch (or a revision marker for hosts without history).
    pub revision: String,
    /// New version marker of every written path.
    pub hashes: BTreeMap<String, String>,
}

/// A provider change request (pull request, merge request) carrying one
/// unpublished entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRequest {
    pub id: String,
    pub branch: String,
    pub collection: String,
    pub entry_path: String,
    pub status: WorkflowStatus,
    /// Head commit of the source branch, when known.
    pub head: Option<String>,
}

/// Repository primitives of one hosting provider.
///
/// Branch and change request operations default to `Unsupported`; hosts
/// that report `branches: true` implement them.
#[async_trait]
pub trait HostApi: Send + Sync {
    fn provider_name(&self) -> &'static str;

    fn capabilities(&self) -> HostCapabilities;

    /// The published branch.
    fn default_branch(&self) -> &str;

    /// Files under `dir`, at most `depth` levels deep (1 = direct children).
    async fn list_files(
        &self,
        branch: &str,
        dir: &str,
        depth: usize,
    ) -> BackendResult<Vec<RemoteFile>>;

    /// Reads a file; its `content_hash` is the host's current version marker.
    async fn read_file(&self, branch: &str, path: &str) -> BackendResult<PersistedFile>;

    /// Current version marker of a path, `None` when absent.
    async fn file_hash(&self, branch: &str, path: &str) -> BackendResult<Option<String>>;

    /// Applies every change of `request` to its branch.
    ///
    /// Hosts without atomic commits apply changes in order and fail with
    /// `PartialWrite` when something was applied before a failure.
    async fn commit(&self, request: &CommitRequest) -> BackendResult<CommitOutcome>;

    async fn branch_head(&self, branch: &str) -> BackendResult<Option<String>> {
        let _ = branch;
        Err(self.no_branches())
    }

    async fn create_branch(&self, branch: &str, from_revision: &str) -> BackendResult<()> {
        let _ = (branch, from_revision);
        Err(self.no_branches())
    }

    async fn delete_branch(&self, branch: &str) -> BackendResult<()> {
        let _ = branch;
        Err(self.no_branches())
    }

    /// Whether `target` can be fast-forwarded to `branch`.
    async fn is_fast_forward(&self, target: &str, branch: &str) -> BackendResult<bool> {
        let _ = (target, branch);
        Err(self.no_branches())
    }

    /// Open change requests created by this layer.
    async fn list_change_requests(&self) -> BackendResult<Vec<ChangeRequest>> {
        Err(self.no_branches())
    }

    async fn open_change_request(
        &self,
        branch: &str,
        status: WorkflowStatus,
    ) -> BackendResult<ChangeRequest> {
        let _ = (branch, status);
        Err(self.no_branches())
    }

    async fn set_change_request_status(
        &self,
        request: &ChangeRequest,
        status: WorkflowStatus,
    ) -> BackendResult<()> {
        let _ = (request, status);
        Err(self.no_branches())
    }

    /// Fast-forwards the default branch to the change request's head.
    async fn merge_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        let _ = request;
        Err(self.no_branches())
    }

    async fn close_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        let _ = request;
        Err(self.no_branches())
    }

    fn no_branches(&self) -> BackendError {
        BackendError::Unsupported(format!(
            "{} does not support branches",
            self.provider_name()
        ))
    }
}

const CMS_BRANCH_PREFIX: &str = "cms/";

/// Branch carrying the unpublished changes of one entry.
pub fn cms_branch(collection: &str, entry_path: &str) -> String {
    format!("{CMS_BRANCH_PREFIX}{collection}/{entry_path}")
}

/// Splits a branch made by [`cms_branch`] into collection and entry path.
pub fn parse_cms_branch(branch: &str) -> Option<(&str, &str)> {
    let rest = branch
        .strip_prefix("refs/heads/")
        .unwrap_or(branch)
        .strip_prefix(CMS_BRANCH_PREFIX)?;
    let (collection, path) = rest.split_once('/')?;
    (!collection.is_empty() && !path.is_empty()).then_some((collection, path))
}

/// Change request label for a status: `{prefix}{status}`.
pub fn status_label(prefix: &str, status: WorkflowStatus) -> String {
    format!("{prefix}{status}")
}

/// Reads a status back from a set of labels.
pub fn status_from_labels<'a>(
    prefix: &str,
    labels: impl IntoIterator<Item = &'a str>,
) -> Option<WorkflowStatus> {
    labels
        .into_iter()
        .filter_map(|label| label.strip_prefix(prefix))
        .find_map(|status| status.parse().ok())
}

/// Builds a [`ChangeRequest`] from provider data, if the branch is ours.
pub(crate) fn change_request(
    id: impl ToString,
    branch: &str,
    status: Option<WorkflowStatus>,
    head: Option<String>,
) -> Option<ChangeRequest> {
    let (collection, entry_path) = parse_cms_branch(branch)?;
    Some(ChangeRequest {
        id: id.to_string(),
        branch: branch
            .strip_prefix("refs/heads/")
            .unwrap_or(branch)
            .to_string(),
        collection: collection.to_string(),
        entry_path: entry_path.to_string(),
        status: status.unwrap_or(WorkflowStatus::Draft),
        head,
    })
}

/// Title of a change request for `branch`.
pub(crate) fn change_request_title(branch: &str) -> String {
    match parse_cms_branch(branch) {
        Some((collection, path)) => format!("Create or update {collection} “{path}”"),
        None => format!("Changes from {branch}"),
    }
}

/// Version markers of the files a commit just wrote.
///
/// The commit has already landed, so a failed lookup only drops that path
/// from the map; callers fall back to [`content_hash`].
pub(crate) async fn committed_hashes<'a, F, Fut>(
    request: &'a CommitRequest,
    lookup: F,
) -> BTreeMap<String, String>
where
    F: Fn(&'a str) -> Fut,
    Fut: Future<Output = BackendResult<Option<String>>>,
{
    let written = request
        .changes
        .iter()
        .filter(|c| !c.is_delete())
        .map(FileChange::path)
        .collect::<Vec<_>>();
    let found = join_all(written.iter().map(|path| lookup(*path))).await;
    let mut hashes = BTreeMap::new();
    for (path, hash) in written.into_iter().zip(found) {
        match hash {
            Ok(Some(hash)) => {
                hashes.insert(path.to_string(), hash);
            }
            Ok(None) => {}
            Err(e) => warn!("Cannot read version of committed {}: {}", path, e),
        }
    }
    hashes
}

/// SHA-256 content hash, for hosts without native blob ids.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Whether `path` lies under `dir` at most `depth` levels deep.
pub(crate) fn within_depth(dir: &str, path: &str, depth: usize) -> bool {
    let dir = dir.trim_matches('/');
    let relative = if dir.is_empty() {
        path
    } else {
        match path
            .strip_prefix(dir)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            Some(rest) => rest,
            None => return false,
        }
    };
    !relative.is_empty() && relative.split('/').count() <= depth.max(1)
}
