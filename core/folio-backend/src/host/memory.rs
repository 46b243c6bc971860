//! In-memory repository (`test-repo`).
//!
//! Keeps a commit graph per branch so the editorial workflow can be
//! exercised without a provider. By default it behaves like a host without
//! multi-file commits: each change of a commit request lands as its own
//! commit, and a failure part-way reports `PartialWrite`. Faults can be
//! injected per path, for the next N commit requests or the next N hash
//! lookups.

use super::{
    ChangeRequest, CommitOutcome, HostApi, HostCapabilities, RemoteFile, change_request,
    content_hash, within_depth,
};
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use folio_model::{CommitRequest, FileChange, PersistedFile, WorkflowStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

type Tree = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
struct Commit {
    parent: Option<String>,
    tree: Tree,
}

#[derive(Debug, Clone)]
struct StoredRequest {
    branch: String,
    status: WorkflowStatus,
}

#[derive(Debug, Default)]
struct State {
    commits: HashMap<String, Commit>,
    branches: BTreeMap<String, String>,
    requests: BTreeMap<u64, StoredRequest>,
    next_commit: u64,
    next_request: u64,
    failing_paths: BTreeSet<String>,
    failing_commits: usize,
    failing_hashes: usize,
}

impl State {
    fn head(&self, branch: &str) -> BackendResult<&str> {
        self.branches
            .get(branch)
            .map(String::as_str)
            .ok_or_else(|| BackendError::NotFound(format!("branch {branch}")))
    }

    fn tree(&self, branch: &str) -> BackendResult<&Tree> {
        let head = self.head(branch)?;
        self.commits
            .get(head)
            .map(|c| &c.tree)
            .ok_or_else(|| BackendError::NotFound(format!("commit {head}")))
    }

    fn add_commit(&mut self, branch: &str, tree: Tree) -> String {
        self.next_commit += 1;
        let id = format!("{:040x}", self.next_commit);
        let parent = self.branches.get(branch).cloned();
        self.commits.insert(id.clone(), Commit { parent, tree });
        self.branches.insert(branch.to_string(), id.clone());
        id
    }

    fn is_ancestor<'a>(&'a self, ancestor: &str, mut commit: Option<&'a str>) -> bool {
        while let Some(id) = commit {
            if id == ancestor {
                return true;
            }
            commit = self.commits.get(id).and_then(|c| c.parent.as_deref());
        }
        false
    }

    fn change_request(&self, id: u64, stored: &StoredRequest) -> Option<ChangeRequest> {
        let head = self.branches.get(&stored.branch).cloned();
        change_request(id, &stored.branch, Some(stored.status), head)
    }
}

/// Checks one change against the tree it is applied to.
fn check_change(tree: &Tree, change: &FileChange) -> BackendResult<()> {
    let actual = tree.get(change.path()).map(|c| content_hash(c));
    let stale = match change {
        FileChange::Write { previous_hash, .. } => previous_hash.as_deref() != actual.as_deref(),
        FileChange::Delete { previous_hash, .. } => {
            actual.is_none()
                || previous_hash
                    .as_deref()
                    .is_some_and(|h| Some(h) != actual.as_deref())
        }
    };
    if stale {
        return Err(BackendError::Conflict {
            path: change.path().to_string(),
            expected: change.previous_hash().map(str::to_string),
            actual,
        });
    }
    Ok(())
}

fn apply_change(tree: &mut Tree, change: &FileChange) {
    match change {
        FileChange::Write { path, content, .. } => {
            tree.insert(path.clone(), content.clone());
        }
        FileChange::Delete { path, .. } => {
            tree.remove(path);
        }
    }
}

fn request_id(request: &ChangeRequest) -> BackendResult<u64> {
    request
        .id
        .parse()
        .map_err(|_| BackendError::NotFound(format!("change request {}", request.id)))
}

/// In-memory repository.
pub struct MemoryHost {
    branch: String,
    atomic: bool,
    latency: Duration,
    state: RwLock<State>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new("main")
    }
}

impl MemoryHost {
    /// Creates an empty repository whose published branch is `branch`.
    pub fn new(branch: &str) -> Self {
        let mut state = State::default();
        state.add_commit(branch, Tree::new());
        Self {
            branch: branch.to_string(),
            atomic: false,
            latency: Duration::ZERO,
            state: RwLock::new(state),
        }
    }

    /// Seeds the published branch with `files` in one commit.
    pub fn with_files<P, C>(mut self, files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        {
            let state = self.state.get_mut();
            let mut tree = state.tree(&self.branch).cloned().unwrap_or_default();
            tree.extend(files.into_iter().map(|(p, c)| (p.into(), c.into())));
            state.add_commit(&self.branch, tree);
        }
        self
    }

    /// Applies commit requests as a single commit.
    pub fn atomic(mut self) -> Self {
        self.atomic = true;
        self
    }

    /// Delays every operation, to make in-flight work observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every write or delete of `path` fail.
    pub async fn fail_path(&self, path: &str) {
        self.state.write().await.failing_paths.insert(path.to_string());
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.write().await;
        state.failing_paths.clear();
        state.failing_commits = 0;
        state.failing_hashes = 0;
    }

    /// Makes the next `count` commit requests fail before applying anything.
    pub async fn fail_next_commits(&self, count: usize) {
        self.state.write().await.failing_commits = count;
    }

    /// Makes the next `count` hash lookups fail with a transient error.
    pub async fn fail_next_hashes(&self, count: usize) {
        self.state.write().await.failing_hashes = count;
    }

    /// Content of `path` on `branch`.
    pub async fn file_on(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.read().await;
        state.tree(branch).ok()?.get(path).cloned()
    }

    /// Content of `path` on the published branch.
    pub async fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.file_on(&self.branch, path).await
    }

    /// Every path on the published branch.
    pub async fn paths(&self) -> Vec<String> {
        let state = self.state.read().await;
        state
            .tree(&self.branch)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Writes a file outside any commit request, as another client would.
    pub async fn put_file(&self, branch: &str, path: &str, content: impl Into<Vec<u8>>) {
        let mut state = self.state.write().await;
        let mut tree = state.tree(branch).cloned().unwrap_or_default();
        tree.insert(path.to_string(), content.into());
        state.add_commit(branch, tree);
    }

    /// Number of commits made so far, the initial one included.
    pub async fn commit_count(&self) -> usize {
        self.state.read().await.commits.len()
    }

    pub async fn branch_names(&self) -> Vec<String> {
        self.state.read().await.branches.keys().cloned().collect()
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn injected(path: &str) -> BackendError {
        BackendError::Network(format!("injected failure writing {path}"))
    }
}

#[async_trait]
impl HostApi for MemoryHost {
    fn provider_name(&self) -> &'static str {
        "test-repo"
    }

    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            atomic_commits: self.atomic,
            branches: true,
        }
    }

    fn default_branch(&self) -> &str {
        &self.branch
    }

    async fn list_files(
        &self,
        branch: &str,
        dir: &str,
        depth: usize,
    ) -> BackendResult<Vec<RemoteFile>> {
        self.pause().await;
        let state = self.state.read().await;
        Ok(state
            .tree(branch)?
            .iter()
            .filter(|(path, _)| within_depth(dir, path, depth))
            .map(|(path, content)| RemoteFile {
                path: path.clone(),
                hash: Some(content_hash(content)),
            })
            .collect())
    }

    async fn read_file(&self, branch: &str, path: &str) -> BackendResult<PersistedFile> {
        self.pause().await;
        let state = self.state.read().await;
        let content = state
            .tree(branch)?
            .get(path)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        Ok(PersistedFile::new(path, content.clone()).with_hash(content_hash(content)))
    }

    async fn file_hash(&self, branch: &str, path: &str) -> BackendResult<Option<String>> {
        self.pause().await;
        let mut state = self.state.write().await;
        if state.failing_hashes > 0 {
            state.failing_hashes -= 1;
            return Err(BackendError::Network(format!("injected failure hashing {path}")));
        }
        Ok(state.tree(branch)?.get(path).map(|c| content_hash(c)))
    }

    async fn commit(&self, request: &CommitRequest) -> BackendResult<CommitOutcome> {
        self.pause().await;
        let mut state = self.state.write().await;
        let mut tree = state.tree(&request.branch)?.clone();

        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(BackendError::Unavailable("injected commit failure".to_string()));
        }

        let mut outcome = CommitOutcome::default();

        if self.atomic {
            for change in &request.changes {
                if state.failing_paths.contains(change.path()) {
                    return Err(Self::injected(change.path()));
                }
                check_change(&tree, change)?;
                apply_change(&mut tree, change);
            }
            outcome.revision = state.add_commit(&request.branch, tree);
        } else {
            let mut applied = Vec::new();
            for (index, change) in request.changes.iter().enumerate() {
                let result = if state.failing_paths.contains(change.path()) {
                    Err(Self::injected(change.path()))
                } else {
                    check_change(&tree, change)
                };
                if let Err(e) = result {
                    if applied.is_empty() {
                        return Err(e);
                    }
                    return Err(BackendError::PartialWrite {
                        applied,
                        failed: request.changes[index..]
                            .iter()
                            .map(|c| c.path().to_string())
                            .collect(),
                        rolled_back: false,
                        reason: e.to_string(),
                    });
                }
                apply_change(&mut tree, change);
                outcome.revision = state.add_commit(&request.branch, tree.clone());
                applied.push(change.path().to_string());
            }
            if applied.is_empty() {
                outcome.revision = state.head(&request.branch)?.to_string();
            }
        }

        for change in &request.changes {
            if let FileChange::Write { path, content, .. } = change {
                outcome.hashes.insert(path.clone(), content_hash(content));
            }
        }
        debug!(
            "Committed {} change(s) to {} in memory",
            request.changes.len(),
            request.branch
        );
        Ok(outcome)
    }

    async fn branch_head(&self, branch: &str) -> BackendResult<Option<String>> {
        self.pause().await;
        Ok(self.state.read().await.branches.get(branch).cloned())
    }

    async fn create_branch(&self, branch: &str, from_revision: &str) -> BackendResult<()> {
        self.pause().await;
        let mut state = self.state.write().await;
        if state.branches.contains_key(branch) {
            return Err(BackendError::Conflict {
                path: format!("refs/heads/{branch}"),
                expected: None,
                actual: state.branches.get(branch).cloned(),
            });
        }
        if !state.commits.contains_key(from_revision) {
            return Err(BackendError::NotFound(format!("commit {from_revision}")));
        }
        state
            .branches
            .insert(branch.to_string(), from_revision.to_string());
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> BackendResult<()> {
        self.pause().await;
        self.state
            .write()
            .await
            .branches
            .remove(branch)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("branch {branch}")))
    }

    async fn is_fast_forward(&self, target: &str, branch: &str) -> BackendResult<bool> {
        self.pause().await;
        let state = self.state.read().await;
        let target_head = state.head(target)?;
        let branch_head = state.head(branch)?;
        Ok(state.is_ancestor(target_head, Some(branch_head)))
    }

    async fn list_change_requests(&self) -> BackendResult<Vec<ChangeRequest>> {
        self.pause().await;
        let state = self.state.read().await;
        Ok(state
            .requests
            .iter()
            .filter_map(|(id, stored)| state.change_request(*id, stored))
            .collect())
    }

    async fn open_change_request(
        &self,
        branch: &str,
        status: WorkflowStatus,
    ) -> BackendResult<ChangeRequest> {
        self.pause().await;
        let mut state = self.state.write().await;
        state.head(branch)?;
        state.next_request += 1;
        let id = state.next_request;
        let stored = StoredRequest {
            branch: branch.to_string(),
            status,
        };
        let request = state
            .change_request(id, &stored)
            .ok_or_else(|| BackendError::Validation(format!("`{branch}` is not an entry branch")))?;
        state.requests.insert(id, stored);
        Ok(request)
    }

    async fn set_change_request_status(
        &self,
        request: &ChangeRequest,
        status: WorkflowStatus,
    ) -> BackendResult<()> {
        self.pause().await;
        let id = request_id(request)?;
        let mut state = self.state.write().await;
        let stored = state
            .requests
            .get_mut(&id)
            .ok_or_else(|| BackendError::NotFound(format!("change request {id}")))?;
        stored.status = status;
        Ok(())
    }

    async fn merge_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        self.pause().await;
        let id = request_id(request)?;
        let mut state = self.state.write().await;
        if !state.requests.contains_key(&id) {
            return Err(BackendError::NotFound(format!("change request {id}")));
        }
        let head = state.head(&request.branch)?.to_string();
        let base = state.head(&self.branch)?.to_string();
        if !state.is_ancestor(&base, Some(&head)) {
            return Err(BackendError::Conflict {
                path: request.branch.clone(),
                expected: Some(base),
                actual: Some(head),
            });
        }
        state.branches.insert(self.branch.clone(), head);
        state.requests.remove(&id);
        Ok(())
    }

    async fn close_change_request(&self, request: &ChangeRequest) -> BackendResult<()> {
        self.pause().await;
        let id = request_id(request)?;
        let mut state = self.state.write().await;
        state
            .requests
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("change request {id}")))
    }
}
